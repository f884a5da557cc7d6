use std::collections::BTreeMap;

use log::{debug, warn};

use super::model::{Column, TrackTable};

/// Fallback label for a categorical column with no observed values at all.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Fill every missing entry: numeric columns with the column median,
/// categorical columns with the column mode (ties broken by the smallest
/// value, i.e. the first candidate in sorted value order).
///
/// A numeric column with no observed values has no median; it is filled with
/// `0.0` and a warning is logged. After this stage no numeric or text column
/// contains a missing entry.
pub fn impute_missing(mut table: TrackTable) -> TrackTable {
    for (name, column) in table.columns_mut() {
        let missing = column.missing_count();
        if missing == 0 {
            continue;
        }
        match column {
            Column::Numeric(values) => {
                let fill = match median(values) {
                    Some(m) => m,
                    None => {
                        warn!("column '{name}' has no observed values; imputing 0.0");
                        0.0
                    }
                };
                for cell in values.iter_mut() {
                    if cell.is_none() {
                        *cell = Some(fill);
                    }
                }
                debug!("imputed {missing} missing values in '{name}' with median {fill}");
            }
            Column::Text(values) => {
                let fill = mode(values).unwrap_or_else(|| UNKNOWN_LABEL.to_string());
                for cell in values.iter_mut() {
                    if cell.is_none() {
                        *cell = Some(fill.clone());
                    }
                }
                debug!("imputed {missing} missing values in '{name}' with mode '{fill}'");
            }
            Column::Bool(_) => {}
        }
    }
    table
}

/// Median of the observed values (average of the two middles for an even
/// count). `None` when nothing is observed.
fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut observed: Vec<f64> = values.iter().filter_map(|c| *c).collect();
    if observed.is_empty() {
        return None;
    }
    observed.sort_by(f64::total_cmp);
    let n = observed.len();
    if n % 2 == 1 {
        Some(observed[n / 2])
    } else {
        Some((observed[n / 2 - 1] + observed[n / 2]) / 2.0)
    }
}

/// Most frequent observed value; on a tie the smallest value wins.
fn mode(values: &[Option<String>]) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for cell in values.iter().flatten() {
        *counts.entry(cell.as_str()).or_default() += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        // Strictly greater keeps the earliest (smallest) key on ties.
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}
