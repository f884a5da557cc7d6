use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{info, warn};
use serde_json::Value as JsonValue;

use super::model::{CellValue, Column, TrackTable};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a track-geometry table from a file. Dispatch by extension.
///
/// Supported formats:
/// * `.csv`  – delimited text, header row with channel names
/// * `.json` – array of records: `[{ "chainage": 0.0, "gauge": 1435.2, ... }]`
pub fn load_file(path: &Path) -> Result<TrackTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "csv" => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("opening {}", path.display()))?;
            load_csv_reader(file)?
        }
        "json" => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("opening {}", path.display()))?;
            load_json_reader(file)?
        }
        other => bail!("Unsupported file extension: .{other}"),
    };

    info!(
        "loaded {} records, {} columns from {}",
        table.len(),
        table.column_names().len(),
        path.display()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with channel names, one record per chainage sample.
/// Empty cells (and `nan`/`na`/`null` markers) are treated as missing.
pub fn load_csv_reader<R: Read>(reader: R) -> Result<TrackTable> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.is_empty() {
        bail!("CSV has no header row");
    }

    let mut cells: Vec<Vec<CellValue>> = vec![Vec::new(); headers.len()];
    for (row_no, result) in reader.records().enumerate() {
        // The reader rejects rows whose field count differs from the header.
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        for (col_idx, value) in record.iter().enumerate() {
            cells[col_idx].push(guess_cell(value));
        }
    }

    build_table(headers, cells)
}

fn guess_cell(s: &str) -> CellValue {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("na")
        || s.eq_ignore_ascii_case("null")
    {
        return CellValue::Missing;
    }
    if s == "true" || s == "false" {
        return CellValue::Bool(s == "true");
    }
    if let Ok(f) = s.parse::<f64>() {
        return CellValue::Float(f);
    }
    CellValue::Text(s.to_string())
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented):
///
/// ```json
/// [
///   { "chainage": 0.0, "gauge": 1435.2, "component_condition": "Good" },
///   ...
/// ]
/// ```
///
/// The first record fixes the column set; keys absent from a later record
/// load as missing values.
pub fn load_json_reader<R: Read>(reader: R) -> Result<TrackTable> {
    let root: JsonValue = serde_json::from_reader(reader).context("parsing JSON")?;
    let records = root.as_array().context("Expected top-level JSON array")?;

    let Some(first) = records.first() else {
        bail!("JSON array contains no records");
    };
    let headers: Vec<String> = first
        .as_object()
        .context("Row 0 is not a JSON object")?
        .keys()
        .cloned()
        .collect();

    let mut cells: Vec<Vec<CellValue>> = vec![Vec::new(); headers.len()];
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        for (col_idx, name) in headers.iter().enumerate() {
            let cell = match obj.get(name) {
                Some(v) => json_to_cell(v),
                None => CellValue::Missing,
            };
            cells[col_idx].push(cell);
        }
    }

    build_table(headers, cells)
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::Null => CellValue::Missing,
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Number(n) => match n.as_f64() {
            Some(f) => CellValue::Float(f),
            None => CellValue::Text(n.to_string()),
        },
        JsonValue::String(s) => CellValue::Text(s.clone()),
        other => CellValue::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Table assembly
// ---------------------------------------------------------------------------

fn build_table(headers: Vec<String>, cells: Vec<Vec<CellValue>>) -> Result<TrackTable> {
    let mut table = TrackTable::new();
    for (name, column_cells) in headers.into_iter().zip(cells) {
        table.insert_column(name, Column::from_cells(column_cells))?;
    }

    let chainage = table
        .numeric("chainage")
        .context("input is missing a numeric 'chainage' column")?;
    check_chainage_order(chainage);

    Ok(table)
}

/// Chainage is expected non-decreasing; a violation is reported but the
/// table is still usable (position-dependent filtering may misbehave).
fn check_chainage_order(chainage: &[Option<f64>]) {
    let mut prev: Option<f64> = None;
    for (i, c) in chainage.iter().enumerate() {
        if let Some(v) = c {
            if let Some(p) = prev {
                if *v < p {
                    warn!("chainage decreases at row {i} ({p} -> {v}); records are expected chainage-ascending");
                    return;
                }
            }
            prev = Some(*v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CSV: &str = "\
chainage,gauge,component_condition
0.0,1435.2,Good
0.25,,Worn
0.5,1436.1,
";

    #[test]
    fn csv_loads_typed_columns() {
        let table = load_csv_reader(SAMPLE_CSV.as_bytes()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.numeric("gauge").unwrap(),
            &[Some(1435.2), None, Some(1436.1)]
        );
        match table.column("component_condition").unwrap() {
            Column::Text(v) => {
                assert_eq!(v[0].as_deref(), Some("Good"));
                assert_eq!(v[2], None);
            }
            other => panic!("expected text column, got {other:?}"),
        }
    }

    #[test]
    fn csv_nan_marker_is_missing() {
        let table =
            load_csv_reader("chainage,twist\n0.0,NaN\n1.0,2.5\n".as_bytes()).unwrap();
        assert_eq!(table.numeric("twist").unwrap(), &[None, Some(2.5)]);
    }

    #[test]
    fn csv_without_chainage_is_rejected() {
        let err = load_csv_reader("gauge\n1435.0\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("chainage"));
    }

    #[test]
    fn json_records_load_with_missing_keys() {
        let json = r#"[
            {"chainage": 0.0, "gauge": 1435.0},
            {"chainage": 0.25}
        ]"#;
        let table = load_json_reader(json.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.numeric("gauge").unwrap(), &[Some(1435.0), None]);
    }

    #[test]
    fn json_booleans_become_bool_column() {
        let json = r#"[
            {"chainage": 0.0, "flagged": true},
            {"chainage": 1.0, "flagged": false}
        ]"#;
        let table = load_json_reader(json.as_bytes()).unwrap();
        assert_eq!(table.require_bool("flagged").unwrap(), &[true, false]);
    }
}
