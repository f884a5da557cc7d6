use thiserror::Error;

/// Errors raised by the analysis stages.
///
/// Load failures are surfaced separately as `anyhow` errors with file/row
/// context; this enum covers the post-load pipeline contract.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    /// A stage's required input column is absent (or has the wrong type).
    #[error("required column '{0}' is missing")]
    MissingColumn(String),

    /// A filter was requested on a column that does not exist or is not numeric.
    #[error("unknown numeric column '{0}'")]
    UnknownColumn(String),

    /// Filter parameters are inconsistent with the chosen algorithm.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A column with the wrong row count was inserted into a table.
    #[error("column '{column}' has {got} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        got: usize,
    },
}
