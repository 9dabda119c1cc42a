//! Reversible table cleaning
//!
//! Operations are applied purely ([`apply`]) and every result is kept as an
//! immutable snapshot in an [`OperationHistory`], so any earlier state can be
//! restored with undo and re-reached with redo.

mod apply;
mod engine;
mod format;
mod history;
mod operation;
mod quality;

pub use apply::{apply, Applied, DiffSummary};
pub use engine::CleaningEngine;
pub use history::{HistoryEntry, HistorySummary, OperationHistory};
pub use operation::{
    CustomFn, DuplicateStrategy, FillStrategy, FormatKind, Operation, OutlierMethod, TextStep,
};
pub use quality::{assess_quality, QualityReport};

use crate::table::ValueKind;
use thiserror::Error;

/// Errors raised by a single cleaning operation
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Cannot convert '{value}' in column '{column}' (row {row}) to {target}")]
    TypeConversion {
        column: String,
        row: usize,
        value: String,
        target: ValueKind,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// History boundary errors
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,
}
