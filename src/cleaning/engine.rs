use super::apply::{apply, Applied};
use super::history::OperationHistory;
use super::operation::Operation;
use super::{HistoryError, OperationError};
use crate::table::Table;
use std::sync::Arc;

/// Runs operations against a table and records each result in the history
///
/// A failed operation leaves both the current table and the history untouched.
#[derive(Debug, Clone)]
pub struct CleaningEngine {
    history: OperationHistory,
}

impl CleaningEngine {
    /// Takes ownership of a scraped table
    pub fn new(table: Table) -> Self {
        Self {
            history: OperationHistory::new(table),
        }
    }

    /// Creates an engine whose history keeps at most `capacity` entries
    pub fn with_capacity(table: Table, capacity: usize) -> Self {
        Self {
            history: OperationHistory::with_capacity(table, capacity),
        }
    }

    /// Applies `op` to the current table
    ///
    /// # Returns
    ///
    /// * `Ok(Arc<Table>)` - The new current table
    /// * `Err(OperationError)` - The operation failed; nothing changed
    pub fn apply(&mut self, op: Operation) -> Result<Arc<Table>, OperationError> {
        let current = self.history.current();
        let Applied { table, diff } = apply(&current, &op).map_err(|e| {
            tracing::warn!("Operation '{}' failed: {}", op.name(), e);
            e
        })?;

        tracing::info!(
            "Applied {}: {} -> {} rows, {} cells changed",
            op.describe(),
            diff.rows_before,
            diff.rows_after,
            diff.cells_changed
        );

        Ok(self.history.push(op, table, diff))
    }

    /// Applies operations in order, stopping at the first failure
    ///
    /// Operations before the failing one stay applied.
    pub fn apply_all<I>(&mut self, ops: I) -> Result<Arc<Table>, OperationError>
    where
        I: IntoIterator<Item = Operation>,
    {
        for op in ops {
            self.apply(op)?;
        }
        Ok(self.current())
    }

    pub fn undo(&mut self) -> Result<Arc<Table>, HistoryError> {
        let table = self.history.undo()?;
        tracing::debug!("Undo: cursor now {}", self.history.cursor());
        Ok(table)
    }

    pub fn redo(&mut self) -> Result<Arc<Table>, HistoryError> {
        let table = self.history.redo()?;
        tracing::debug!("Redo: cursor now {}", self.history.cursor());
        Ok(table)
    }

    /// Returns to the original table, discarding every recorded operation
    pub fn reset(&mut self) -> Arc<Table> {
        tracing::info!("Resetting to original table");
        self.history.reset()
    }

    pub fn current(&self) -> Arc<Table> {
        self.history.current()
    }

    pub fn history(&self) -> &OperationHistory {
        &self.history
    }

    /// Consumes the engine and returns the current table
    pub fn into_table(self) -> Table {
        let current = self.history.current();
        drop(self.history);
        Arc::try_unwrap(current).unwrap_or_else(|shared| (*shared).clone())
    }
}
