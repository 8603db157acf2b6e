// Library exports for chartseries

pub mod column;
pub mod csv_reader;
pub mod data;
pub mod error;
pub mod evaluate;
pub mod parser;
pub mod series;
pub mod value;

pub use column::Column;
pub use data::{Change, Data};
pub use error::{EvalError, ParseError, SeriesError};
pub use evaluate::evaluate;
pub use parser::parse;
pub use series::{BindingSpec, DataSeries, SeriesSpec};
pub use value::{Value, ValueKind};

use serde::Deserialize;

/// What a column does when one record fails to evaluate while its
/// aggregates are being recomputed.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Propagate the first error and leave the column's derived state empty.
    #[serde(rename = "abort")]
    #[default]
    Abort,
    /// Record an undefined value for the failing record and continue.
    #[serde(rename = "skip")]
    Skip,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
pub struct ColumnOptions {
    #[serde(default, rename = "onError")]
    pub on_error: FailurePolicy,
}

impl ColumnOptions {
    pub fn skipping_errors() -> Self {
        Self {
            on_error: FailurePolicy::Skip,
        }
    }
}
