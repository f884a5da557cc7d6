use log::warn;
use serde::{Deserialize, Serialize};

use super::error::PipelineError;
use super::filter::{apply_filter, FilterSpec};
use super::flags::{apply_flags, Thresholds};
use super::impute::impute_missing;
use super::metrics::compute_metrics;
use super::model::TrackTable;

/// Channels smoothed by default when a filter is configured; reduced to the
/// subset actually present in the table.
pub const DEFAULT_FILTER_COLUMNS: [&str; 5] = [
    "gauge",
    "alignment_left",
    "alignment_right",
    "twist",
    "cross_level",
];

/// One analysis run: imputation toggle, optional noise filter and the
/// channels it applies to, and the threshold set for flagging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub impute: bool,
    pub filter: Option<FilterSpec>,
    pub filter_columns: Vec<String>,
    pub thresholds: Thresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            impute: true,
            filter: None,
            filter_columns: DEFAULT_FILTER_COLUMNS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            thresholds: Thresholds::default(),
        }
    }
}

/// Run the full analysis: impute → filter → derive metrics → flag.
///
/// Each stage is a pure table-to-table transformation; the first stage error
/// aborts the run. Configured filter columns that are absent from the table
/// are skipped with a warning (the default column set covers channels an
/// input file may legitimately omit). Flags are computed from the raw derived
/// metrics, not the `_filtered` siblings; the filtered series exist for the
/// presentation layer.
pub fn run(mut table: TrackTable, config: &PipelineConfig) -> Result<TrackTable, PipelineError> {
    if config.impute {
        table = impute_missing(table);
    }

    if let Some(spec) = &config.filter {
        for column in &config.filter_columns {
            if table.numeric(column).is_none() {
                warn!("skipping filter for '{column}': no such numeric column");
                continue;
            }
            table = apply_filter(table, column, spec)?;
        }
    }

    table = compute_metrics(table)?;
    apply_flags(table, &config.thresholds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::FilterKind;
    use crate::data::loader::load_csv_reader;

    const SAMPLE_CSV: &str = "\
chainage,gauge,alignment_left,alignment_right,twist,cross_level,unevenness_left,unevenness_right,vertical_acceleration,lateral_acceleration
0.0,1442.0,6.0,6.0,0.0,1.0,2.0,4.0,0.1,0.1
0.25,,0.0,0.0,1.0,2.0,3.0,3.0,0.2,0.1
0.5,1438.0,12.0,0.0,0.5,1.5,2.5,3.5,0.1,0.2
0.75,1436.0,1.0,1.0,0.0,1.0,2.0,3.0,0.9,0.1
";

    #[test]
    fn default_run_imputes_derives_and_flags() {
        let table = load_csv_reader(SAMPLE_CSV.as_bytes()).unwrap();
        let out = run(table, &PipelineConfig::default()).unwrap();

        // Missing gauge imputed with the median of [1442, 1438, 1436] = 1438.
        assert_eq!(out.numeric("gauge").unwrap()[1], Some(1438.0));
        assert_eq!(
            out.require_bool("gauge_deviation_flag").unwrap(),
            &[true, false, false, false]
        );
        assert_eq!(
            out.require_bool("alignment_flag").unwrap(),
            &[false, false, true, false]
        );
        assert_eq!(
            out.require_bool("vertical_acc_flag").unwrap(),
            &[false, false, false, true]
        );
        assert_eq!(
            out.require_bool("flagged").unwrap(),
            &[true, false, true, true]
        );
    }

    #[test]
    fn filtering_preserves_rows_and_chainage() {
        let table = load_csv_reader(SAMPLE_CSV.as_bytes()).unwrap();
        let chainage_before = table.dense_numeric("chainage").unwrap();

        let config = PipelineConfig {
            filter: Some(FilterSpec::new(FilterKind::Rolling, 3, 0)),
            ..PipelineConfig::default()
        };
        let out = run(table, &config).unwrap();

        assert_eq!(out.len(), 4);
        assert_eq!(out.dense_numeric("chainage").unwrap(), chainage_before);
        for column in DEFAULT_FILTER_COLUMNS {
            assert!(
                out.numeric(&format!("{column}_filtered")).is_some(),
                "missing filtered sibling for {column}"
            );
        }
    }

    #[test]
    fn invalid_filter_parameters_abort_the_run() {
        let table = load_csv_reader(SAMPLE_CSV.as_bytes()).unwrap();
        let config = PipelineConfig {
            filter: Some(FilterSpec::new(FilterKind::Rolling, 2, 0)),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            run(table, &config),
            Err(PipelineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn absent_filter_column_is_skipped() {
        let table = load_csv_reader(SAMPLE_CSV.as_bytes()).unwrap();
        let config = PipelineConfig {
            filter: Some(FilterSpec::new(FilterKind::Rolling, 3, 0)),
            filter_columns: vec!["gauge".to_string(), "rail_wear_left".to_string()],
            ..PipelineConfig::default()
        };
        let out = run(table, &config).unwrap();
        assert!(out.numeric("gauge_filtered").is_some());
        assert!(!out.has_column("rail_wear_left_filtered"));
    }
}
