//! Undo/redo over immutable table snapshots
//!
//! The history is an ordered list of entries plus a cursor. Entries before the
//! cursor are applied; entries at or after it form the redo tail. The table at
//! cursor `c` is the snapshot of entry `c - 1`, or the original table when
//! `c == 0`.

use super::apply::DiffSummary;
use super::operation::Operation;
use super::HistoryError;
use crate::table::Table;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One applied operation and the table it produced
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub operation: Operation,
    pub snapshot: Arc<Table>,
    pub diff: DiffSummary,
    pub timestamp: DateTime<Utc>,
}

/// A line of the history listing
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    /// 1-based position in the history
    pub index: usize,
    pub name: String,
    pub description: String,
    pub rows_affected: usize,
    pub timestamp: DateTime<Utc>,
    /// True for the entry whose snapshot is the current table
    pub current: bool,
}

#[derive(Debug, Clone)]
pub struct OperationHistory {
    original: Arc<Table>,
    entries: Vec<HistoryEntry>,
    cursor: usize,
    capacity: Option<usize>,
}

impl OperationHistory {
    /// Creates an unbounded history rooted at `original`
    pub fn new(original: Table) -> Self {
        Self {
            original: Arc::new(original),
            entries: Vec::new(),
            cursor: 0,
            capacity: None,
        }
    }

    /// Creates a history that keeps at most `capacity` entries
    ///
    /// When full, the oldest entry is folded into the baseline: its snapshot
    /// becomes the table that undo eventually returns to.
    pub fn with_capacity(original: Table, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::new(original)
        }
    }

    /// Records an applied operation
    ///
    /// Any redo tail is discarded before the entry is appended, and the cursor
    /// moves onto the new entry.
    pub fn push(&mut self, operation: Operation, table: Table, diff: DiffSummary) -> Arc<Table> {
        self.entries.truncate(self.cursor);

        let snapshot = Arc::new(table);
        self.entries.push(HistoryEntry {
            operation,
            snapshot: Arc::clone(&snapshot),
            diff,
            timestamp: Utc::now(),
        });
        self.cursor = self.entries.len();

        if let Some(capacity) = self.capacity {
            while self.entries.len() > capacity {
                let oldest = self.entries.remove(0);
                tracing::debug!(
                    "History full, folding '{}' into the baseline",
                    oldest.operation.name()
                );
                self.original = oldest.snapshot;
                self.cursor -= 1;
            }
        }

        snapshot
    }

    /// Steps back one operation and returns the table at the new cursor
    pub fn undo(&mut self) -> Result<Arc<Table>, HistoryError> {
        if self.cursor == 0 {
            return Err(HistoryError::NothingToUndo);
        }
        self.cursor -= 1;
        Ok(self.current())
    }

    /// Moves forward one operation and returns its stored table
    pub fn redo(&mut self) -> Result<Arc<Table>, HistoryError> {
        if self.cursor == self.entries.len() {
            return Err(HistoryError::NothingToRedo);
        }
        self.cursor += 1;
        Ok(self.current())
    }

    /// Jumps back to the original table and discards every entry
    pub fn reset(&mut self) -> Arc<Table> {
        self.entries.clear();
        self.cursor = 0;
        self.current()
    }

    pub fn current(&self) -> Arc<Table> {
        match self.cursor {
            0 => Arc::clone(&self.original),
            c => Arc::clone(&self.entries[c - 1].snapshot),
        }
    }

    pub fn original(&self) -> &Table {
        &self.original
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Operations that produced the current table, oldest first
    pub fn applied(&self) -> impl Iterator<Item = &Operation> {
        self.entries[..self.cursor].iter().map(|e| &e.operation)
    }

    pub fn summary(&self) -> Vec<HistorySummary> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| HistorySummary {
                index: i + 1,
                name: entry.operation.name().to_string(),
                description: entry.operation.describe(),
                rows_affected: entry.diff.rows_affected(),
                timestamp: entry.timestamp,
                current: i + 1 == self.cursor,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn table_of(n: i64) -> Table {
        let mut table = Table::with_columns(["n"]);
        table.push_row(vec![Some(Value::Integer(n))]);
        table
    }

    fn op(name: &str) -> Operation {
        Operation::TrimText {
            column: name.to_string(),
        }
    }

    #[test]
    fn test_undo_redo_walk() {
        let mut history = OperationHistory::new(table_of(0));
        history.push(op("a"), table_of(1), DiffSummary::default());
        history.push(op("b"), table_of(2), DiffSummary::default());

        assert_eq!(*history.undo().unwrap(), table_of(1));
        assert_eq!(*history.undo().unwrap(), table_of(0));
        assert!(matches!(history.undo(), Err(HistoryError::NothingToUndo)));

        assert_eq!(*history.redo().unwrap(), table_of(1));
        assert_eq!(*history.redo().unwrap(), table_of(2));
        assert!(matches!(history.redo(), Err(HistoryError::NothingToRedo)));
    }

    #[test]
    fn test_push_truncates_redo_tail() {
        let mut history = OperationHistory::new(table_of(0));
        history.push(op("a"), table_of(1), DiffSummary::default());
        history.push(op("b"), table_of(2), DiffSummary::default());
        history.undo().unwrap();

        history.push(op("c"), table_of(3), DiffSummary::default());

        assert_eq!(history.len(), 2);
        assert_eq!(history.cursor(), 2);
        assert!(!history.can_redo());
        let names: Vec<_> = history.applied().map(|o| o.describe()).collect();
        assert_eq!(names, vec!["trim text in 'a'", "trim text in 'c'"]);
    }

    #[test]
    fn test_capacity_folds_oldest_into_baseline() {
        let mut history = OperationHistory::with_capacity(table_of(0), 2);
        for n in 1..=3 {
            history.push(op("x"), table_of(n), DiffSummary::default());
        }

        assert_eq!(history.len(), 2);
        assert_eq!(*history.original(), table_of(1));
        history.undo().unwrap();
        assert_eq!(*history.undo().unwrap(), table_of(1));
        assert!(history.undo().is_err());
    }

    #[test]
    fn test_reset_discards_entries() {
        let mut history = OperationHistory::new(table_of(0));
        history.push(op("a"), table_of(1), DiffSummary::default());

        assert_eq!(*history.reset(), table_of(0));
        assert!(history.is_empty());
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_summary_marks_current_entry() {
        let mut history = OperationHistory::new(table_of(0));
        history.push(op("a"), table_of(1), DiffSummary::default());
        history.push(op("b"), table_of(2), DiffSummary::default());
        history.undo().unwrap();

        let summary = history.summary();
        assert_eq!(summary.len(), 2);
        assert!(summary[0].current);
        assert!(!summary[1].current);
        assert_eq!(summary[1].index, 2);
        assert_eq!(summary[0].name, "trim-text");
    }
}
