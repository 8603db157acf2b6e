// Error types for expression parsing, evaluation and series mutation

use thiserror::Error;

/// Malformed expression text, reported when the expression is assigned.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("failed to parse expression '{expression}': {message}")]
pub struct ParseError {
    pub expression: String,
    pub message: String,
}

impl ParseError {
    pub fn new(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            message: message.into(),
        }
    }
}

/// An expression applied an operation the record's shape does not support.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("'{method}' expects a collection, found {found}")]
    NotACollection { method: String, found: String },
    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: String,
        right: String,
    },
    #[error("cannot apply '{op}' to {operand}")]
    InvalidOperand { op: String, operand: String },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Failure raised while a series or column reacts to a data change.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("column '{column}' failed on record {index}: {source}")]
    Column {
        column: String,
        index: usize,
        #[source]
        source: EvalError,
    },
    #[error("index {index} out of bounds for data of length {len}")]
    OutOfBounds { index: usize, len: usize },
    #[error(transparent)]
    Parse(#[from] ParseError),
}
