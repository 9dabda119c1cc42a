//! Records and tables
//!
//! Extraction yields [`Record`]s whose field sets may differ from one another.
//! A [`Table`] reconciles them into a fixed column order (the union of all
//! field names, first-seen order) with absent cells where a record lacked a field.

mod value;

pub use value::{Value, ValueKey, ValueKind};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One extracted logical row: field name to raw value, in extraction order
pub type Record = IndexMap<String, Option<String>>;

/// A cell: `None` marks an absent value
pub type Cell = Option<Value>;

/// Column-aligned dataset
///
/// Every row holds exactly one cell per column. Cleaning never mutates a table
/// in place; it builds a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableData")]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

#[derive(Deserialize)]
struct TableData {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl TryFrom<TableData> for Table {
    type Error = String;

    fn try_from(data: TableData) -> Result<Self, Self::Error> {
        Table::from_parts(data.columns, data.rows)
    }
}

/// Per-column overview used in reports
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub present: usize,
    pub absent: usize,
    /// The single kind shared by all present values, if there is one
    pub kind: Option<ValueKind>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table with the given columns
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Builds a table from columns and rows, checking row widths and column uniqueness
    pub fn from_parts(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, String> {
        let mut seen = std::collections::HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(format!("duplicate column '{}'", column));
            }
        }
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(format!(
                "row {} has {} cells, expected {}",
                index,
                row.len(),
                columns.len()
            ));
        }
        Ok(Self { columns, rows })
    }

    /// Reconciles records into a table
    pub fn from_records<I: IntoIterator<Item = Record>>(records: I) -> Self {
        let mut table = Self::new();
        table.extend_records(records);
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)?.as_ref()
    }

    /// Cells of one column, top to bottom
    pub fn column(&self, index: usize) -> impl Iterator<Item = Option<&Value>> + '_ {
        self.rows.iter().map(move |row| row[index].as_ref())
    }

    /// Appends a record, adding any unseen field names as new columns
    ///
    /// Existing rows receive absent cells for new columns; the record receives
    /// absent cells for columns it lacks.
    pub fn push_record(&mut self, record: Record) {
        for name in record.keys() {
            if self.column_index(name).is_none() {
                self.columns.push(name.clone());
                for row in &mut self.rows {
                    row.push(None);
                }
            }
        }

        let positions: HashMap<&str, usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let mut row = vec![None; self.columns.len()];
        for (name, raw) in record {
            if let Some(&index) = positions.get(name.as_str()) {
                row[index] = raw.map(Value::Text);
            }
        }
        self.rows.push(row);
    }

    pub fn extend_records<I: IntoIterator<Item = Record>>(&mut self, records: I) {
        for record in records {
            self.push_record(record);
        }
    }

    /// Appends a fully-formed row
    ///
    /// # Panics
    ///
    /// Panics if the row width differs from the column count.
    pub fn push_row(&mut self, row: Vec<Cell>) {
        assert_eq!(
            row.len(),
            self.columns.len(),
            "row width must match column count"
        );
        self.rows.push(row);
    }

    /// Splits the table into its columns and rows
    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Cell>>) {
        (self.columns, self.rows)
    }

    /// Rows identical to an earlier row in every column
    pub fn duplicate_count(&self) -> usize {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|row| {
                let key: Vec<Option<ValueKey>> =
                    row.iter().map(|cell| cell.as_ref().map(Value::key)).collect();
                !seen.insert(key)
            })
            .count()
    }

    pub fn column_summaries(&self) -> Vec<ColumnSummary> {
        self.columns
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let mut present = 0;
                let mut kind: Option<Option<ValueKind>> = None;
                for value in self.column(index).flatten() {
                    present += 1;
                    kind = match kind {
                        None => Some(Some(value.kind())),
                        Some(Some(k)) if k == value.kind() => Some(Some(k)),
                        _ => Some(None),
                    };
                }
                ColumnSummary {
                    name: name.clone(),
                    present,
                    absent: self.rows.len() - present,
                    kind: kind.flatten(),
                }
            })
            .collect()
    }
}
