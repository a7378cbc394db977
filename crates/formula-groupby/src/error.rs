use crate::storage::StoredValue;
use crate::value::ValueType;
use std::fmt;

pub type GroupByResult<T> = Result<T, GroupByError>;

/// Fatal errors. Any of these aborts the run; partial group totals are discarded.
#[derive(Debug, thiserror::Error)]
pub enum GroupByError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("aggregate {output} ({function}) requires a subject column")]
    MissingSubject { output: String, function: String },

    #[error("invalid parameter for aggregate {output}: {message}")]
    InvalidParameter { output: String, message: String },

    #[error("duplicate output column: {0}")]
    DuplicateOutput(String),

    #[error("row width mismatch: expected {expected} values, got {actual}")]
    RowWidthMismatch { expected: usize, actual: usize },

    #[error("cannot {action} while the engine is {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    #[error("descriptor error: {0}")]
    Descriptor(#[from] serde_json::Error),

    #[error("upstream error: {0}")]
    Source(String),

    #[error("downstream error: {0}")]
    Sink(String),
}

/// Stable codes attached to rows diverted to the error channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Value could not be converted to the number an aggregate needs.
    NotNumeric,
    /// Binary-string bytes could not be parsed as the column's logical type.
    Undecodable,
    /// Dictionary index outside the column's dictionary.
    BadIndex,
    /// Running sum left the representable range.
    Overflow,
}

impl ErrorCode {
    pub fn as_code(self) -> &'static str {
        match self {
            ErrorCode::NotNumeric => "GROUPBY001",
            ErrorCode::Undecodable => "GROUPBY002",
            ErrorCode::BadIndex => "GROUPBY003",
            ErrorCode::Overflow => "GROUPBY004",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// A per-row conversion failure. Recoverable: the row is rejected and processing continues.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{column}: {message}")]
pub struct CoercionError {
    pub code: ErrorCode,
    pub column: String,
    pub message: String,
}

impl CoercionError {
    pub fn new(code: ErrorCode, column: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            column: column.into(),
            message: message.into(),
        }
    }

    pub(crate) fn not_numeric(column: &str, found: ValueType) -> Self {
        Self::new(
            ErrorCode::NotNumeric,
            column,
            format!("{found} value cannot be used as a number"),
        )
    }

    pub(crate) fn overflow(column: &str) -> Self {
        Self::new(ErrorCode::Overflow, column, "numeric overflow in running sum")
    }
}

/// A rejected input row, as handed to the error channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorRow {
    pub row: Vec<StoredValue>,
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorRow {
    pub(crate) fn new(row: &[StoredValue], err: &CoercionError) -> Self {
        Self {
            row: row.to_vec(),
            code: err.code,
            message: err.to_string(),
        }
    }
}
