use log::debug;

use super::error::PipelineError;
use super::model::{Column, TrackTable};

/// Nominal standard gauge, mm.
pub const NOMINAL_GAUGE: f64 = 1435.0;

/// Append the derived composite metrics:
///
/// * `gauge_deviation` — `gauge - 1435.0`
/// * `alignment_total` — `sqrt(left² + right²)`; lateral defect severity is
///   direction-agnostic, so left/right combine euclidean
/// * `unevenness_total` — `(left + right) / 2`; both rails affect ride
///   quality equally
///
/// Twist, cross level and the acceleration channels are already scalar
/// magnitudes and pass through untouched. Requires the raw channels to be
/// present ([`PipelineError::MissingColumn`] otherwise); run after
/// imputation so no metric comes out missing.
pub fn compute_metrics(mut table: TrackTable) -> Result<TrackTable, PipelineError> {
    let gauge = table.dense_numeric("gauge")?;
    let alignment_left = table.dense_numeric("alignment_left")?;
    let alignment_right = table.dense_numeric("alignment_right")?;
    let unevenness_left = table.dense_numeric("unevenness_left")?;
    let unevenness_right = table.dense_numeric("unevenness_right")?;

    let gauge_deviation: Vec<f64> = gauge.iter().map(|g| g - NOMINAL_GAUGE).collect();
    let alignment_total: Vec<f64> = alignment_left
        .iter()
        .zip(&alignment_right)
        .map(|(l, r)| (l * l + r * r).sqrt())
        .collect();
    let unevenness_total: Vec<f64> = unevenness_left
        .iter()
        .zip(&unevenness_right)
        .map(|(l, r)| (l + r) / 2.0)
        .collect();

    table.insert_column("gauge_deviation", numeric(gauge_deviation))?;
    table.insert_column("alignment_total", numeric(alignment_total))?;
    table.insert_column("unevenness_total", numeric(unevenness_total))?;
    debug!("derived metrics computed for {} records", table.len());
    Ok(table)
}

fn numeric(values: Vec<f64>) -> Column {
    Column::Numeric(values.into_iter().map(|v| v.is_finite().then_some(v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_table() -> TrackTable {
        let mut table = TrackTable::new();
        let cols: &[(&str, &[f64])] = &[
            ("chainage", &[0.0, 0.25, 0.5]),
            ("gauge", &[1442.0, 1438.0, 1435.0]),
            ("alignment_left", &[6.0, 0.0, 12.0]),
            ("alignment_right", &[6.0, 0.0, 0.0]),
            ("unevenness_left", &[2.0, 4.0, -1.0]),
            ("unevenness_right", &[4.0, 4.0, 3.0]),
        ];
        for (name, values) in cols {
            table
                .insert_column(
                    *name,
                    Column::Numeric(values.iter().map(|&v| Some(v)).collect()),
                )
                .unwrap();
        }
        table
    }

    #[test]
    fn gauge_deviation_is_exact() {
        let out = compute_metrics(raw_table()).unwrap();
        assert_eq!(
            out.numeric("gauge_deviation").unwrap(),
            &[Some(7.0), Some(3.0), Some(0.0)]
        );
    }

    #[test]
    fn alignment_total_matches_euclidean_combination() {
        let out = compute_metrics(raw_table()).unwrap();
        let total = out.dense_numeric("alignment_total").unwrap();
        let expected = [72.0f64.sqrt(), 0.0, 12.0];
        for (got, want) in total.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
            assert!(*got >= 0.0);
        }
    }

    #[test]
    fn unevenness_total_is_the_rail_average() {
        let out = compute_metrics(raw_table()).unwrap();
        assert_eq!(
            out.numeric("unevenness_total").unwrap(),
            &[Some(3.0), Some(4.0), Some(1.0)]
        );
    }

    #[test]
    fn missing_raw_channel_is_reported() {
        let mut table = raw_table();
        table = {
            // Rebuild without alignment_right.
            let mut slim = TrackTable::new();
            for name in table.column_names().to_vec() {
                if name != "alignment_right" {
                    slim.insert_column(name.clone(), table.column(&name).unwrap().clone())
                        .unwrap();
                }
            }
            slim
        };
        let err = compute_metrics(table).unwrap_err();
        assert_eq!(err, PipelineError::MissingColumn("alignment_right".to_string()));
    }
}
