use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde_json::{Map, Number, Value as JsonValue};

use super::model::{Column, TrackTable};

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Write the table as delimited text: header row in column insertion order,
/// missing values as empty fields, flags as `true`/`false`.
pub fn write_csv<W: Write>(table: &TrackTable, writer: W) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(table.column_names())
        .context("writing CSV header")?;

    for row in 0..table.len() {
        let record: Vec<String> = table
            .column_names()
            .iter()
            .filter_map(|name| table.column(name))
            .map(|col| cell_text(col, row))
            .collect();
        out.write_record(&record)
            .with_context(|| format!("writing CSV row {row}"))?;
    }
    out.flush().context("flushing CSV output")?;
    Ok(())
}

fn cell_text(column: &Column, row: usize) -> String {
    match column {
        Column::Numeric(v) => v[row].map(|f| f.to_string()).unwrap_or_default(),
        Column::Text(v) => v[row].clone().unwrap_or_default(),
        Column::Bool(v) => v[row].to_string(),
    }
}

/// [`write_csv`] to a file path.
pub fn export_csv(table: &TrackTable, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_csv(table, file)?;
    info!("wrote {} records to {}", table.len(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Write the table as a records-oriented JSON array with the same column
/// set as the CSV export; missing values serialize as `null`.
pub fn write_json<W: Write>(table: &TrackTable, writer: W) -> Result<()> {
    let mut records = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let mut record = Map::new();
        for name in table.column_names() {
            if let Some(col) = table.column(name) {
                record.insert(name.clone(), cell_json(col, row));
            }
        }
        records.push(JsonValue::Object(record));
    }
    serde_json::to_writer(writer, &JsonValue::Array(records)).context("writing JSON output")?;
    Ok(())
}

fn cell_json(column: &Column, row: usize) -> JsonValue {
    match column {
        Column::Numeric(v) => v[row]
            .and_then(Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Column::Text(v) => v[row]
            .clone()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null),
        Column::Bool(v) => JsonValue::Bool(v[row]),
    }
}

/// [`write_json`] to a file path.
pub fn export_json(table: &TrackTable, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_json(table, file)?;
    info!("wrote {} records to {}", table.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::{load_csv_reader, load_json_reader};

    fn sample_table() -> TrackTable {
        let mut table = TrackTable::new();
        table
            .insert_column("chainage", Column::Numeric(vec![Some(0.0), Some(0.25)]))
            .unwrap();
        table
            .insert_column("gauge", Column::Numeric(vec![Some(1435.5), None]))
            .unwrap();
        table
            .insert_column(
                "component_condition",
                Column::Text(vec![Some("Good".into()), None]),
            )
            .unwrap();
        table
            .insert_column("flagged", Column::Bool(vec![false, true]))
            .unwrap();
        table
    }

    #[test]
    fn csv_round_trips_schema_and_missing_values() {
        let mut buf = Vec::new();
        write_csv(&sample_table(), &mut buf).unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("chainage,gauge,component_condition,flagged\n"));

        let reloaded = load_csv_reader(buf.as_slice()).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.numeric("gauge").unwrap(), &[Some(1435.5), None]);
        assert_eq!(reloaded.require_bool("flagged").unwrap(), &[false, true]);
    }

    #[test]
    fn json_round_trips_records() {
        let mut buf = Vec::new();
        write_json(&sample_table(), &mut buf).unwrap();

        let reloaded = load_json_reader(buf.as_slice()).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.numeric("chainage").unwrap(), &[Some(0.0), Some(0.25)]);
        assert_eq!(reloaded.numeric("gauge").unwrap(), &[Some(1435.5), None]);
        match reloaded.column("component_condition").unwrap() {
            Column::Text(v) => assert_eq!(v[0].as_deref(), Some("Good")),
            other => panic!("expected text column, got {other:?}"),
        }
    }
}
