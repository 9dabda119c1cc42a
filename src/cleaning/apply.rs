//! Pure application of a single operation
//!
//! `apply` never touches its input table; it builds and returns a new one
//! together with a summary of what changed.

use super::format::{fix_encoding, standardize_format, FormatRule};
use super::operation::{DuplicateStrategy, FillStrategy, Operation, OutlierMethod, TextStep};
use super::OperationError;
use crate::table::{Cell, Table, Value, ValueKey, ValueKind};
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// A new table plus what the operation did to it
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub table: Table,
    pub diff: DiffSummary,
}

/// Shape and content change between two tables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffSummary {
    pub rows_before: usize,
    pub rows_after: usize,
    pub columns_added: Vec<String>,
    pub columns_removed: Vec<String>,
    /// Cells whose value changed, compared by column name when the row count is unchanged
    pub cells_changed: usize,
}

impl DiffSummary {
    /// Compares two tables
    pub fn between(before: &Table, after: &Table) -> Self {
        let columns_added = after
            .columns()
            .iter()
            .filter(|c| before.column_index(c).is_none())
            .cloned()
            .collect();
        let columns_removed = before
            .columns()
            .iter()
            .filter(|c| after.column_index(c).is_none())
            .cloned()
            .collect();

        let mut cells_changed = 0;
        if before.row_count() == after.row_count() {
            for (after_index, name) in after.columns().iter().enumerate() {
                if let Some(before_index) = before.column_index(name) {
                    cells_changed += before
                        .rows()
                        .iter()
                        .zip(after.rows())
                        .filter(|(b, a)| b[before_index] != a[after_index])
                        .count();
                }
            }
        }

        Self {
            rows_before: before.row_count(),
            rows_after: after.row_count(),
            columns_added,
            columns_removed,
            cells_changed,
        }
    }

    pub fn rows_removed(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }

    /// Rows dropped plus cells rewritten
    pub fn rows_affected(&self) -> usize {
        self.rows_removed() + self.cells_changed
    }
}

/// Applies `op` to `table`, returning the transformed copy
///
/// # Arguments
///
/// * `table` - The input table, left untouched
/// * `op` - The operation to run
///
/// # Returns
///
/// * `Ok(Applied)` - The new table and its diff against the input
/// * `Err(OperationError)` - The operation could not run; nothing changed
pub fn apply(table: &Table, op: &Operation) -> Result<Applied, OperationError> {
    let result = match op {
        Operation::RemoveDuplicates { strategy, columns } => {
            remove_duplicates(table, *strategy, columns)?
        }
        Operation::FillMissing {
            strategy,
            column,
            value,
        } => fill_missing(table, *strategy, column, value.as_deref())?,
        Operation::DropMissing { columns } => drop_missing(table, columns)?,
        Operation::ConvertType {
            column,
            target,
            strict,
        } => convert_type(table, column, *target, *strict)?,
        Operation::RenameColumn { from, to } => rename_column(table, from, to)?,
        Operation::ReorderColumns { order } => reorder_columns(table, order)?,
        Operation::RemoveOutliers {
            method,
            column,
            threshold,
        } => remove_outliers(
            table,
            *method,
            column,
            threshold.unwrap_or_else(|| method.default_threshold()),
        )?,
        Operation::TrimText { column } => {
            map_text(table, column, |s| s.trim().to_string())?
        }
        Operation::CleanText { column, steps } => {
            let cleaner = TextCleaner::new(steps)?;
            map_text(table, column, |s| cleaner.clean(s))?
        }
        Operation::StandardizeFormat {
            column,
            format,
            pattern,
            replacement,
            layout,
            symbol,
        } => {
            let rule = FormatRule::new(
                *format,
                pattern.as_deref(),
                replacement.as_deref(),
                layout.as_deref(),
                symbol.as_deref(),
            )?;
            standardize_format(table, column, &rule)?
        }
        Operation::FixEncoding { columns } => fix_encoding(table, columns)?,
        Operation::Custom { func, .. } => func.call(table),
    };

    let diff = DiffSummary::between(table, &result);
    Ok(Applied {
        table: result,
        diff,
    })
}

pub(super) fn require_column(table: &Table, column: &str) -> Result<usize, OperationError> {
    table
        .column_index(column)
        .ok_or_else(|| OperationError::ColumnNotFound(column.to_string()))
}

pub(super) fn require_columns(table: &Table, columns: &[String]) -> Result<Vec<usize>, OperationError> {
    if columns.is_empty() {
        return Ok((0..table.column_count()).collect());
    }
    columns.iter().map(|c| require_column(table, c)).collect()
}

fn keep_rows(table: &Table, keep: impl Fn(usize, &[Cell]) -> bool) -> Table {
    let mut out = Table::with_columns(table.columns().iter().cloned());
    for (index, row) in table.rows().iter().enumerate() {
        if keep(index, row) {
            out.push_row(row.clone());
        }
    }
    out
}

pub(super) fn map_column(table: &Table, index: usize, f: impl Fn(usize, &Cell) -> Cell) -> Table {
    let mut out = Table::with_columns(table.columns().iter().cloned());
    for (row_index, row) in table.rows().iter().enumerate() {
        let mut row = row.clone();
        row[index] = f(row_index, &row[index]);
        out.push_row(row);
    }
    out
}

fn remove_duplicates(
    table: &Table,
    strategy: DuplicateStrategy,
    columns: &[String],
) -> Result<Table, OperationError> {
    let indices = require_columns(table, columns)?;
    let keys: Vec<Vec<Option<ValueKey>>> = table
        .rows()
        .iter()
        .map(|row| {
            indices
                .iter()
                .map(|&i| row[i].as_ref().map(Value::key))
                .collect()
        })
        .collect();

    let keep: HashSet<usize> = match strategy {
        DuplicateStrategy::First => {
            let mut seen = HashSet::new();
            (0..keys.len()).filter(|&i| seen.insert(&keys[i])).collect()
        }
        DuplicateStrategy::Last => {
            let mut seen = HashSet::new();
            (0..keys.len())
                .rev()
                .filter(|&i| seen.insert(&keys[i]))
                .collect()
        }
        DuplicateStrategy::All => {
            let mut counts: HashMap<&Vec<Option<ValueKey>>, usize> = HashMap::new();
            for key in &keys {
                *counts.entry(key).or_default() += 1;
            }
            (0..keys.len()).filter(|&i| counts[&keys[i]] == 1).collect()
        }
    };

    Ok(keep_rows(table, |i, _| keep.contains(&i)))
}

/// The kind shared by every present value of a column, if any
pub(super) fn column_kind(table: &Table, index: usize) -> Option<ValueKind> {
    let mut kinds = table.column(index).flatten().map(Value::kind);
    let first = kinds.next()?;
    kinds.all(|k| k == first).then_some(first)
}

/// Shapes a computed statistic like the column it fills
fn numeric_fill(stat: f64, kind: Option<ValueKind>, column: &str) -> Result<Value, OperationError> {
    if !stat.is_finite() {
        return Err(OperationError::InvalidParameter(format!(
            "statistic for column '{}' is out of range ({})",
            column, stat
        )));
    }

    Ok(match kind {
        Some(ValueKind::Integer)
            if stat.fract() == 0.0 && stat >= i64::MIN as f64 && stat < i64::MAX as f64 =>
        {
            Value::Integer(stat as i64)
        }
        Some(ValueKind::Text) => Value::Text(stat.to_string()),
        _ => Value::Float(stat),
    })
}

pub(super) fn numeric_values(table: &Table, index: usize) -> Vec<f64> {
    table
        .column(index)
        .flatten()
        .filter_map(Value::as_f64)
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Linear-interpolated quantile of sorted values
pub(super) fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}

pub(super) fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values
}

fn fill_missing(
    table: &Table,
    strategy: FillStrategy,
    column: &str,
    value: Option<&str>,
) -> Result<Table, OperationError> {
    let index = require_column(table, column)?;
    let kind = column_kind(table, index);

    let fill = match strategy {
        FillStrategy::Value => {
            let raw = value.ok_or_else(|| {
                OperationError::InvalidParameter(format!(
                    "fill value required for column '{}'",
                    column
                ))
            })?;
            let target = kind.unwrap_or(ValueKind::Text);
            let converted = Value::from(raw).convert(target).ok_or_else(|| {
                OperationError::InvalidParameter(format!(
                    "fill value '{}' is not a valid {} for column '{}'",
                    raw, target, column
                ))
            })?;
            Some(converted)
        }
        FillStrategy::Mean | FillStrategy::Median => {
            let values = numeric_values(table, index);
            if values.is_empty() {
                return Err(OperationError::InvalidParameter(format!(
                    "column '{}' has no numeric values",
                    column
                )));
            }
            let stat = if strategy == FillStrategy::Mean {
                mean(&values)
            } else {
                quantile(&sorted(values), 0.5)
            };
            Some(numeric_fill(stat, kind, column)?)
        }
        FillStrategy::Mode => {
            // Ties go to the value seen first
            let mut counts: HashMap<ValueKey, (usize, usize)> = HashMap::new();
            let mut present = Vec::new();
            for (position, value) in table.column(index).flatten().enumerate() {
                let entry = counts.entry(value.key()).or_insert((0, position));
                entry.0 += 1;
                present.push(value);
            }
            let mode = present
                .into_iter()
                .max_by(|a, b| {
                    let (ca, pa) = counts[&a.key()];
                    let (cb, pb) = counts[&b.key()];
                    ca.cmp(&cb).then(pb.cmp(&pa))
                })
                .cloned()
                .ok_or_else(|| {
                    OperationError::InvalidParameter(format!(
                        "column '{}' has no values to take a mode from",
                        column
                    ))
                })?;
            Some(mode)
        }
        FillStrategy::ForwardFill | FillStrategy::BackwardFill => None,
    };

    if let Some(fill) = fill {
        return Ok(map_column(table, index, |_, cell| {
            cell.clone().or_else(|| Some(fill.clone()))
        }));
    }

    let cells: Vec<Cell> = table.column(index).map(|c| c.cloned()).collect();
    let mut filled = vec![None; cells.len()];
    let mut carry: Cell = None;
    let order: Box<dyn Iterator<Item = usize>> = if strategy == FillStrategy::ForwardFill {
        Box::new(0..cells.len())
    } else {
        Box::new((0..cells.len()).rev())
    };
    for i in order {
        if cells[i].is_some() {
            carry = cells[i].clone();
        }
        filled[i] = cells[i].clone().or_else(|| carry.clone());
    }

    Ok(map_column(table, index, |row, _| filled[row].clone()))
}

fn drop_missing(table: &Table, columns: &[String]) -> Result<Table, OperationError> {
    let indices = require_columns(table, columns)?;
    Ok(keep_rows(table, |_, row| {
        indices.iter().all(|&i| row[i].is_some())
    }))
}

fn convert_type(
    table: &Table,
    column: &str,
    target: ValueKind,
    strict: bool,
) -> Result<Table, OperationError> {
    let index = require_column(table, column)?;

    if strict {
        for (row, cell) in table.column(index).enumerate() {
            if let Some(value) = cell {
                if value.convert(target).is_none() {
                    return Err(OperationError::TypeConversion {
                        column: column.to_string(),
                        row,
                        value: value.to_string(),
                        target,
                    });
                }
            }
        }
    }

    Ok(map_column(table, index, |_, cell| {
        cell.as_ref().and_then(|v| v.convert(target))
    }))
}

fn rename_column(table: &Table, from: &str, to: &str) -> Result<Table, OperationError> {
    let index = require_column(table, from)?;
    if to.trim().is_empty() {
        return Err(OperationError::InvalidParameter(
            "new column name cannot be empty".to_string(),
        ));
    }
    if from != to && table.column_index(to).is_some() {
        return Err(OperationError::InvalidParameter(format!(
            "cannot rename '{}' to '{}': column already exists",
            from, to
        )));
    }

    let mut columns = table.columns().to_vec();
    columns[index] = to.to_string();
    Table::from_parts(columns, table.rows().to_vec()).map_err(OperationError::InvalidParameter)
}

fn reorder_columns(table: &Table, order: &[String]) -> Result<Table, OperationError> {
    let mut indices = Vec::with_capacity(table.column_count());
    for name in order {
        let index = require_column(table, name)?;
        if indices.contains(&index) {
            return Err(OperationError::InvalidParameter(format!(
                "column '{}' listed twice",
                name
            )));
        }
        indices.push(index);
    }
    for index in 0..table.column_count() {
        if !indices.contains(&index) {
            indices.push(index);
        }
    }

    let columns = indices
        .iter()
        .map(|&i| table.columns()[i].clone())
        .collect();
    let rows = table
        .rows()
        .iter()
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Table::from_parts(columns, rows).map_err(OperationError::InvalidParameter)
}

fn remove_outliers(
    table: &Table,
    method: OutlierMethod,
    column: &str,
    threshold: f64,
) -> Result<Table, OperationError> {
    let index = require_column(table, column)?;
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(OperationError::InvalidParameter(format!(
            "outlier threshold must be a positive number, got {}",
            threshold
        )));
    }

    let values = numeric_values(table, index);
    if values.is_empty() {
        return Err(OperationError::InvalidParameter(format!(
            "column '{}' has no numeric values",
            column
        )));
    }

    let is_outlier: Box<dyn Fn(f64) -> bool> = match method {
        OutlierMethod::Iqr => {
            let values = sorted(values);
            let q1 = quantile(&values, 0.25);
            let q3 = quantile(&values, 0.75);
            let spread = q3 - q1;
            let (low, high) = (q1 - threshold * spread, q3 + threshold * spread);
            Box::new(move |x| x < low || x > high)
        }
        OutlierMethod::Zscore => {
            let n = values.len();
            let mu = mean(&values);
            let std = if n < 2 {
                0.0
            } else {
                (values.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
            };
            if !std.is_finite() {
                return Err(OperationError::InvalidParameter(format!(
                    "column '{}' is too spread out for a z-score",
                    column
                )));
            }
            if std == 0.0 {
                return Ok(table.clone());
            }
            Box::new(move |x| ((x - mu) / std).abs() > threshold)
        }
    };

    // Absent and non-numeric cells are never outliers
    Ok(keep_rows(table, |_, row| {
        !row[index]
            .as_ref()
            .and_then(Value::as_f64)
            .is_some_and(|x| is_outlier(x))
    }))
}

fn map_text(
    table: &Table,
    column: &str,
    f: impl Fn(&str) -> String,
) -> Result<Table, OperationError> {
    let index = require_column(table, column)?;
    Ok(map_column(table, index, |_, cell| match cell {
        Some(Value::Text(s)) => Some(Value::Text(f(s))),
        other => other.clone(),
    }))
}

struct TextCleaner {
    steps: Vec<(TextStep, Option<Regex>)>,
}

impl TextCleaner {
    fn new(steps: &[TextStep]) -> Result<Self, OperationError> {
        if steps.is_empty() {
            return Err(OperationError::InvalidParameter(
                "clean-text needs at least one step".to_string(),
            ));
        }

        let steps = steps
            .iter()
            .map(|&step| {
                let pattern = match step {
                    TextStep::RemoveSpecialChars => Some(r"[^\w\s]"),
                    TextStep::RemoveNumbers => Some(r"\d+"),
                    TextStep::RemoveHtmlTags => Some(r"<[^>]*>"),
                    TextStep::NormalizeWhitespace => Some(r"\s+"),
                    _ => None,
                };
                let regex = pattern
                    .map(Regex::new)
                    .transpose()
                    .map_err(|e| OperationError::InvalidParameter(e.to_string()))?;
                Ok((step, regex))
            })
            .collect::<Result<Vec<_>, OperationError>>()?;

        Ok(Self { steps })
    }

    fn clean(&self, input: &str) -> String {
        let mut text = input.to_string();
        for (step, regex) in &self.steps {
            text = match (step, regex) {
                (TextStep::Lowercase, _) => text.to_lowercase(),
                (TextStep::Uppercase, _) => text.to_uppercase(),
                (TextStep::TitleCase, _) => title_case(&text),
                (TextStep::NormalizeWhitespace, Some(re)) => {
                    re.replace_all(&text, " ").trim().to_string()
                }
                (_, Some(re)) => re.replace_all(&text, "").into_owned(),
                (_, None) => text,
            };
        }
        text
    }
}

/// Upper-cases the first letter of each run of letters, lower-cases the rest
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_alpha = false;
    for c in text.chars() {
        if previous_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_alpha = c.is_alphabetic();
    }
    out
}
