//! Session and table statistics
//!
//! This module turns a finished session and its cleaned table into the
//! report printed by the command line tool.

use crate::cleaning::{assess_quality, HistorySummary, QualityReport};
use crate::crawler::{AttemptOutcome, SessionOutcome};
use crate::table::{ColumnSummary, Table, Value, ValueKind};

/// Rows shown in the table preview
const PREVIEW_ROWS: usize = 5;

/// Widest a preview cell may get before it is cut
const PREVIEW_CELL_WIDTH: usize = 24;

/// Everything the final report shows
#[derive(Debug, Clone)]
pub struct ScrapeReport {
    pub status: String,
    pub error: Option<String>,
    pub pages_fetched: u32,
    pub fetch_attempts: u32,
    pub retries: u32,
    pub renders: u32,
    pub records: usize,
    pub elapsed_seconds: f64,
    pub failed_attempts: Vec<String>,
    pub warnings: Vec<String>,
    pub rows: usize,
    pub duplicates: usize,
    pub columns: Vec<ColumnSummary>,
    pub operations: Vec<HistorySummary>,
    pub quality: QualityReport,
}

impl ScrapeReport {
    /// Builds a report from a session outcome and the cleaned table
    ///
    /// # Arguments
    ///
    /// * `outcome` - The finished session
    /// * `table` - The table after cleaning
    /// * `operations` - History summary of the cleaning pipeline
    pub fn new(outcome: &SessionOutcome, table: &Table, operations: Vec<HistorySummary>) -> Self {
        let failed_attempts = outcome
            .attempts
            .iter()
            .filter_map(|a| match &a.outcome {
                AttemptOutcome::Success => None,
                AttemptOutcome::Retryable(reason) | AttemptOutcome::Permanent(reason) => Some(
                    format!("{} (attempt {}): {}", a.url, a.attempt, reason),
                ),
            })
            .collect();

        Self {
            status: outcome.status.as_str().to_string(),
            error: outcome.error().map(|e| e.to_string()),
            pages_fetched: outcome.stats.pages_fetched,
            fetch_attempts: outcome.stats.fetch_attempts,
            retries: outcome.stats.retries,
            renders: outcome.stats.renders,
            records: outcome.stats.records,
            elapsed_seconds: outcome.stats.elapsed.as_secs_f64(),
            failed_attempts,
            warnings: outcome.warnings.clone(),
            rows: table.row_count(),
            duplicates: table.duplicate_count(),
            columns: table.column_summaries(),
            operations,
            quality: assess_quality(table),
        }
    }

    /// Share of fetch attempts that succeeded, in percent
    pub fn success_rate(&self) -> f64 {
        if self.fetch_attempts == 0 {
            return 0.0;
        }
        let failed = self.failed_attempts.len() as f64;
        (self.fetch_attempts as f64 - failed) / self.fetch_attempts as f64 * 100.0
    }
}

/// Prints a report to stdout in a formatted manner
pub fn print_report(report: &ScrapeReport) {
    println!("=== Scrape Summary ===\n");

    println!("Session:");
    println!("  Status: {}", report.status);
    if let Some(error) = &report.error {
        println!("  Error: {}", error);
    }
    println!("  Pages fetched: {}", report.pages_fetched);
    println!(
        "  Fetch attempts: {} ({} retries, {:.1}% successful)",
        report.fetch_attempts,
        report.retries,
        report.success_rate()
    );
    println!("  Renders: {}", report.renders);
    println!("  Records extracted: {}", report.records);
    println!("  Elapsed: {:.2}s", report.elapsed_seconds);
    println!();

    if !report.failed_attempts.is_empty() {
        println!("Failed Attempts ({}):", report.failed_attempts.len());
        for attempt in &report.failed_attempts {
            println!("  - {}", attempt);
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("Warnings:");
        for warning in &report.warnings {
            println!("  - {}", warning);
        }
        println!();
    }

    if !report.operations.is_empty() {
        println!("Cleaning:");
        for op in &report.operations {
            println!(
                "  {}. {} - {} rows affected{}",
                op.index,
                op.description,
                op.rows_affected,
                if op.current { " (current)" } else { "" }
            );
        }
        println!();
    }

    println!(
        "Data ({} rows, {} columns, {} duplicate rows):",
        report.rows,
        report.columns.len(),
        report.duplicates
    );
    for column in &report.columns {
        println!(
            "  {}: {} present, {} absent, {}",
            column.name,
            column.present,
            column.absent,
            kind_label(column.kind)
        );
    }

    let quality = &report.quality;
    println!();
    println!("Quality: {:.1}/100", quality.score);
    for issue in &quality.issues {
        println!("  ! {}", issue);
    }
    for recommendation in &quality.recommendations {
        println!("  - {}", recommendation);
    }
}

/// Prints the first rows of a table
pub fn print_preview(table: &Table) {
    if table.column_count() == 0 {
        return;
    }

    println!();
    println!("{}", table.columns().join(" | "));
    for row in table.rows().iter().take(PREVIEW_ROWS) {
        let cells: Vec<String> = row.iter().map(|cell| preview_cell(cell.as_ref())).collect();
        println!("{}", cells.join(" | "));
    }
    if table.row_count() > PREVIEW_ROWS {
        println!("... {} more rows", table.row_count() - PREVIEW_ROWS);
    }
}

fn preview_cell(cell: Option<&Value>) -> String {
    let Some(value) = cell else {
        return "-".to_string();
    };
    let text = value.to_string();
    if text.chars().count() > PREVIEW_CELL_WIDTH {
        let cut: String = text.chars().take(PREVIEW_CELL_WIDTH - 3).collect();
        format!("{}...", cut)
    } else {
        text
    }
}

fn kind_label(kind: Option<ValueKind>) -> String {
    kind.map_or_else(|| "mixed or empty".to_string(), |k| k.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{AttemptRecord, SessionStats, SessionStatus};
    use crate::table::Record;
    use chrono::Utc;
    use std::time::Duration;

    fn attempt(n: u32, outcome: AttemptOutcome) -> AttemptRecord {
        AttemptRecord {
            url: "https://example.com/".to_string(),
            attempt: n,
            status_code: None,
            outcome,
            elapsed: Duration::from_millis(10),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_report_from_outcome() {
        let mut record = Record::new();
        record.insert("name".to_string(), Some("Tea".to_string()));
        record.insert("price".to_string(), None);
        let table = Table::from_records(vec![record]);

        let outcome = SessionOutcome {
            table: table.clone(),
            status: SessionStatus::Completed,
            stats: SessionStats {
                pages_fetched: 1,
                fetch_attempts: 2,
                retries: 1,
                renders: 0,
                records: 1,
                elapsed: Duration::from_millis(1500),
            },
            attempts: vec![
                attempt(1, AttemptOutcome::Retryable("HTTP 503".to_string())),
                attempt(2, AttemptOutcome::Success),
            ],
            warnings: Vec::new(),
        };

        let report = ScrapeReport::new(&outcome, &table, Vec::new());
        assert_eq!(report.status, "completed");
        assert!(report.error.is_none());
        assert_eq!(report.failed_attempts.len(), 1);
        assert!(report.failed_attempts[0].contains("HTTP 503"));
        assert_eq!(report.success_rate(), 50.0);
        assert_eq!(report.rows, 1);
        assert_eq!(report.duplicates, 0);
        assert_eq!(report.columns[1].absent, 1);
        assert_eq!(report.quality.missing_percentage, 50.0);
        assert!(report.quality.score < 100.0);
    }

    #[test]
    fn test_preview_cell() {
        assert_eq!(preview_cell(None), "-");
        assert_eq!(preview_cell(Some(&Value::Integer(7))), "7");
        let long = Value::Text("x".repeat(40));
        assert_eq!(preview_cell(Some(&long)).chars().count(), PREVIEW_CELL_WIDTH);
    }
}
