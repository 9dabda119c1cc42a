use crate::cleaning::{CleaningEngine, Operation};
use crate::config::Target;
use crate::storage::{StorageError, StorageResult};
use crate::table::Table;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// A saved scrape: the target, the cleaned table and the operations that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub target: Target,

    /// Hash of the configuration file the scrape was run from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,

    pub table: Table,

    /// Operations applied to the scraped table, oldest first
    #[serde(default)]
    pub operations: Vec<Operation>,

    pub saved_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(target: Target, table: Table) -> Self {
        Self {
            target,
            config_hash: None,
            table,
            operations: Vec::new(),
            saved_at: Utc::now(),
        }
    }

    /// Captures the engine's current table and the operations applied up to its cursor
    pub fn from_engine(target: Target, config_hash: Option<String>, engine: &CleaningEngine) -> Self {
        Self {
            target,
            config_hash,
            table: (*engine.current()).clone(),
            operations: engine.history().applied().cloned().collect(),
            saved_at: Utc::now(),
        }
    }
}

/// Writes a snapshot as pretty-printed JSON
///
/// # Arguments
///
/// * `snapshot` - The snapshot to write
/// * `path` - Destination file; replaced if it exists
///
/// # Returns
///
/// * `Ok(())` - Snapshot written
/// * `Err(StorageError::Serialization)` - The snapshot holds a custom operation or another unserializable value
/// * `Err(StorageError::Io)` - The file could not be written
pub fn save_snapshot(snapshot: &Snapshot, path: &Path) -> StorageResult<()> {
    // Serialize before touching the file so a failure leaves any old snapshot intact
    let encoded = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&encoded)?;
    writer.flush()?;

    tracing::info!(
        "Saved snapshot of {} rows to {}",
        snapshot.table.row_count(),
        path.display()
    );
    Ok(())
}

/// Reads a snapshot written by [`save_snapshot`]
pub fn load_snapshot(path: &Path) -> StorageResult<Snapshot> {
    let reader = BufReader::new(File::open(path)?);
    let snapshot: Snapshot =
        serde_json::from_reader(reader).map_err(|e| StorageError::Serialization(e.to_string()))?;

    tracing::debug!(
        "Loaded snapshot of {} rows from {}",
        snapshot.table.row_count(),
        path.display()
    );
    Ok(snapshot)
}
