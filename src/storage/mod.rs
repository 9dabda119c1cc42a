//! Storage module for persisting scrape results
//!
//! A snapshot bundles the target, the cleaned table and the operation log
//! into one self-describing JSON document. Field names are preserved and
//! absent cells stay distinct from empty strings, so a loaded snapshot is
//! identical to the one saved.

mod snapshot;

pub use snapshot::{load_snapshot, save_snapshot, Snapshot};

use thiserror::Error;

/// Errors that can occur while saving or loading snapshots
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
