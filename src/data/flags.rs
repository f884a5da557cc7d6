use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use super::error::PipelineError;
use super::model::{Column, TrackTable};

// ---------------------------------------------------------------------------
// Threshold configuration
// ---------------------------------------------------------------------------

/// Safety thresholds, one per monitored parameter. Passed explicitly so a
/// caller can override individual limits per analysis run; the defaults are
/// the standard maintenance limits.
///
/// `cross_level` carries no flag of its own — the presentation layer draws it
/// as a chart band — but it belongs to the same configuration set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Gauge deviation from nominal, mm.
    pub gauge: f64,
    /// Combined alignment error, mm.
    pub alignment: f64,
    /// Twist, mm/m.
    pub twist: f64,
    /// Cross level, mm.
    pub cross_level: f64,
    /// Average unevenness, mm.
    pub unevenness: f64,
    /// Vertical acceleration, g.
    pub vertical_acc: f64,
    /// Lateral acceleration, g.
    pub lateral_acc: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            gauge: 5.0,
            alignment: 10.0,
            twist: 5.0,
            cross_level: 7.0,
            unevenness: 7.0,
            vertical_acc: 0.7,
            lateral_acc: 0.5,
        }
    }
}

/// The six flag columns produced by [`apply_flags`], with their metric
/// sources, in output order.
pub const FLAG_COLUMNS: [(&str, &str); 6] = [
    ("gauge_deviation_flag", "gauge_deviation"),
    ("alignment_flag", "alignment_total"),
    ("twist_flag", "twist"),
    ("unevenness_flag", "unevenness_total"),
    ("vertical_acc_flag", "vertical_acceleration"),
    ("lateral_acc_flag", "lateral_acceleration"),
];

// ---------------------------------------------------------------------------
// Flagging
// ---------------------------------------------------------------------------

/// Compare each metric against its threshold and append the boolean flag
/// columns plus the combined `flagged` indicator (logical OR of the six).
///
/// A flag fires iff `|metric| > threshold` (strict). The stage is pure:
/// identical metric values always produce identical flags, and re-running it
/// overwrites the flag columns with the same result. Requires the metric
/// columns from [`super::metrics::compute_metrics`].
pub fn apply_flags(
    mut table: TrackTable,
    thresholds: &Thresholds,
) -> Result<TrackTable, PipelineError> {
    let limits = [
        thresholds.gauge,
        thresholds.alignment,
        thresholds.twist,
        thresholds.unevenness,
        thresholds.vertical_acc,
        thresholds.lateral_acc,
    ];

    let mut combined = vec![false; table.len()];
    for ((flag_name, metric), limit) in FLAG_COLUMNS.iter().zip(limits) {
        let metric_values = table.dense_numeric(metric)?;
        let flags: Vec<bool> = metric_values.iter().map(|v| v.abs() > limit).collect();
        for (any, flag) in combined.iter_mut().zip(&flags) {
            *any |= flag;
        }
        table.insert_column(*flag_name, Column::Bool(flags))?;
    }

    let exceed_count = combined.iter().filter(|f| **f).count();
    debug!("{exceed_count} of {} records exceed at least one threshold", table.len());
    table.insert_column("flagged", Column::Bool(combined))?;
    Ok(table)
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Per-parameter flag counts plus the chainages of flagged records; what the
/// dashboard's flag-distribution and flagged-segments views consume.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagSummary {
    pub records: usize,
    pub flagged_records: usize,
    /// (flag column, count) in [`FLAG_COLUMNS`] order.
    pub counts: Vec<(String, usize)>,
    /// Chainage of every record with `flagged == true`, in table order.
    pub flagged_chainages: Vec<f64>,
}

impl FlagSummary {
    /// Summarize a table that already carries the flag columns.
    pub fn from_table(table: &TrackTable) -> Result<Self, PipelineError> {
        let mut counts = Vec::with_capacity(FLAG_COLUMNS.len());
        for (flag_name, _) in FLAG_COLUMNS {
            let count = table.require_bool(flag_name)?.iter().filter(|f| **f).count();
            counts.push((flag_name.to_string(), count));
        }

        let flagged = table.require_bool("flagged")?;
        let chainage = table.chainage()?;
        let flagged_chainages: Vec<f64> = flagged
            .iter()
            .zip(chainage)
            .filter(|(f, _)| **f)
            .filter_map(|(_, c)| *c)
            .collect();

        Ok(Self {
            records: table.len(),
            flagged_records: flagged.iter().filter(|f| **f).count(),
            counts,
            flagged_chainages,
        })
    }
}

impl fmt::Display for FlagSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} of {} records exceed at least one threshold",
            self.flagged_records, self.records
        )?;
        for (name, count) in &self.counts {
            writeln!(f, "  {name:<24} {count}")?;
        }
        Ok(())
    }
}
