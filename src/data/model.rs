use std::collections::BTreeMap;
use std::fmt;

use crate::data::error::PipelineError;

// ---------------------------------------------------------------------------
// CellValue – a single parsed cell before column typing
// ---------------------------------------------------------------------------

/// A dynamically-typed cell as produced by the loaders, before the whole
/// column has been assigned a uniform type.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Float(f64),
    Text(String),
    Bool(bool),
    Missing,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Missing => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Column – one uniformly-typed series
// ---------------------------------------------------------------------------

/// A single column of the table. Numeric and text columns track missing
/// entries as `None`; boolean columns are only ever produced by the flagging
/// stage and are always complete.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    Bool(Vec<bool>),
}

impl Column {
    /// Number of entries (rows) in the column.
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::Bool(v) => v.len(),
        }
    }

    /// Whether the column has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Assign a uniform type to a sequence of loosely-typed cells.
    ///
    /// * All non-missing cells are floats → `Numeric`
    /// * All cells are booleans (none missing) → `Bool`
    /// * Anything else → `Text` (cells rendered via `Display`)
    pub fn from_cells(cells: Vec<CellValue>) -> Self {
        let all_float = cells
            .iter()
            .all(|c| matches!(c, CellValue::Float(_) | CellValue::Missing));
        if all_float {
            return Column::Numeric(
                cells
                    .into_iter()
                    .map(|c| match c {
                        CellValue::Float(v) => Some(v),
                        _ => None,
                    })
                    .collect(),
            );
        }

        let all_bool = cells.iter().all(|c| matches!(c, CellValue::Bool(_)));
        if all_bool {
            return Column::Bool(
                cells
                    .into_iter()
                    .map(|c| matches!(c, CellValue::Bool(true)))
                    .collect(),
            );
        }

        Column::Text(
            cells
                .into_iter()
                .map(|c| match c {
                    CellValue::Missing => None,
                    other => Some(other.to_string()),
                })
                .collect(),
        )
    }

    /// Number of missing entries.
    pub fn missing_count(&self) -> usize {
        match self {
            Column::Numeric(v) => v.iter().filter(|c| c.is_none()).count(),
            Column::Text(v) => v.iter().filter(|c| c.is_none()).count(),
            Column::Bool(_) => 0,
        }
    }

    /// Keep only the rows at the given indices (in the given order).
    fn take_rows(&self, keep: &[usize]) -> Self {
        match self {
            Column::Numeric(v) => Column::Numeric(keep.iter().map(|&i| v[i]).collect()),
            Column::Text(v) => Column::Text(keep.iter().map(|&i| v[i].clone()).collect()),
            Column::Bool(v) => Column::Bool(keep.iter().map(|&i| v[i]).collect()),
        }
    }
}

// ---------------------------------------------------------------------------
// TrackTable – the full measurement table
// ---------------------------------------------------------------------------

/// Column-major table of track-geometry records, ordered by chainage.
///
/// Column insertion order is preserved (it drives export layout); lookups go
/// through a name index. Every column has the same length, and every pipeline
/// stage preserves row count and row order.
#[derive(Debug, Clone, Default)]
pub struct TrackTable {
    column_order: Vec<String>,
    columns: BTreeMap<String, Column>,
    rows: usize,
}

impl TrackTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records (rows).
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Whether the table has no records.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> &[String] {
        &self.column_order
    }

    /// Whether a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Insert (or replace) a column. The first column fixes the row count;
    /// every later column must match it.
    pub fn insert_column(
        &mut self,
        name: impl Into<String>,
        column: Column,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if self.column_order.is_empty() {
            self.rows = column.len();
        } else if column.len() != self.rows {
            return Err(PipelineError::LengthMismatch {
                column: name,
                expected: self.rows,
                got: column.len(),
            });
        }
        if !self.columns.contains_key(&name) {
            self.column_order.push(name.clone());
        }
        self.columns.insert(name, column);
        Ok(())
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Numeric column as an `Option<f64>` slice, or `None` if the column is
    /// absent or not numeric.
    pub fn numeric(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.columns.get(name) {
            Some(Column::Numeric(v)) => Some(v),
            _ => None,
        }
    }

    /// Numeric column, erroring with [`PipelineError::MissingColumn`] when
    /// absent or non-numeric.
    pub fn require_numeric(&self, name: &str) -> Result<&[Option<f64>], PipelineError> {
        self.numeric(name)
            .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
    }

    /// Numeric column as a dense `Vec<f64>`, with missing entries mapped to
    /// `NaN`. Threshold comparisons against `NaN` are false, so an unimputed
    /// record can never fire a flag.
    pub fn dense_numeric(&self, name: &str) -> Result<Vec<f64>, PipelineError> {
        Ok(self
            .require_numeric(name)?
            .iter()
            .map(|c| c.unwrap_or(f64::NAN))
            .collect())
    }

    /// Boolean column, erroring when absent or not boolean.
    pub fn require_bool(&self, name: &str) -> Result<&[bool], PipelineError> {
        match self.columns.get(name) {
            Some(Column::Bool(v)) => Ok(v),
            _ => Err(PipelineError::MissingColumn(name.to_string())),
        }
    }

    /// Iterate all columns mutably (map order, not insertion order).
    pub(crate) fn columns_mut(&mut self) -> impl Iterator<Item = (&String, &mut Column)> {
        self.columns.iter_mut()
    }

    /// The chainage series (the table's ordering key).
    pub fn chainage(&self) -> Result<&[Option<f64>], PipelineError> {
        self.require_numeric("chainage")
    }

    /// Sub-table with `min <= chainage <= max`, preserving row order and the
    /// full column set. Records with missing chainage are dropped.
    pub fn slice_chainage(&self, min: f64, max: f64) -> Result<TrackTable, PipelineError> {
        let keep: Vec<usize> = self
            .chainage()?
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Some(v) if *v >= min && *v <= max))
            .map(|(i, _)| i)
            .collect();

        let mut out = TrackTable::new();
        for name in &self.column_order {
            // Every name in column_order has a map entry.
            if let Some(col) = self.columns.get(name) {
                out.insert_column(name.clone(), col.take_rows(&keep))?;
            }
        }
        Ok(out)
    }
}
