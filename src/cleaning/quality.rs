//! Data quality assessment
//!
//! A read-only check of a table that scores it out of 100 and says what
//! cleaning would help. Nothing here changes the table or its history.

use super::apply::{column_kind, numeric_values, quantile, sorted};
use crate::table::{Table, Value, ValueKind};

/// Missing cells above this share of all cells count as an issue
const MISSING_LIMIT: f64 = 20.0;

/// Duplicate rows above this share of all rows count as an issue
const DUPLICATE_LIMIT: f64 = 5.0;

/// Text columns where more than this share of rows parse as numbers
const NUMERIC_TEXT_SHARE: f64 = 0.8;

/// IQR outliers above this share of rows flag a column
const OUTLIER_SHARE: f64 = 0.05;

/// Cells with punctuation or symbols above this share of rows flag a column
const SPECIAL_CHAR_SHARE: f64 = 0.3;

/// Score, findings and advice for one table
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    /// 0 to 100, higher is cleaner
    pub score: f64,
    pub missing_percentage: f64,
    pub duplicates: usize,
    pub duplicate_percentage: f64,
    pub issues: Vec<String>,
    /// Overall verdict first, then one suggestion per kind of issue
    pub recommendations: Vec<String>,
}

/// Assesses the quality of `table`
///
/// The score starts at 100 and loses up to 30 points for missing cells, up to
/// 20 for duplicate rows, 5 per column of numbers stored as text, 3 per column
/// with many outliers and 2 per text problem.
pub fn assess_quality(table: &Table) -> QualityReport {
    let rows = table.row_count();
    let total_cells = rows * table.column_count();
    if total_cells == 0 {
        return QualityReport {
            score: 0.0,
            missing_percentage: 0.0,
            duplicates: 0,
            duplicate_percentage: 0.0,
            issues: vec!["Table is empty".to_string()],
            recommendations: Vec::new(),
        };
    }

    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    let missing = table.rows().iter().flatten().filter(|c| c.is_none()).count();
    let missing_percentage = missing as f64 / total_cells as f64 * 100.0;
    if missing_percentage > MISSING_LIMIT {
        issues.push(format!("High missing data: {:.1}%", missing_percentage));
        recommendations
            .push("Fill missing values or drop columns that are mostly empty".to_string());
    }

    let duplicates = table.duplicate_count();
    let duplicate_percentage = duplicates as f64 / rows as f64 * 100.0;
    if duplicate_percentage > DUPLICATE_LIMIT {
        issues.push(format!("High duplicate rows: {:.1}%", duplicate_percentage));
        recommendations.push("Remove duplicate rows".to_string());
    }

    let mut numeric_text = Vec::new();
    let mut outlier_columns = Vec::new();
    let mut text_issues = Vec::new();

    for (index, name) in table.columns().iter().enumerate() {
        match column_kind(table, index) {
            Some(ValueKind::Text) => {
                let numeric = table.column(index).flatten().filter_map(Value::as_f64).count();
                if numeric as f64 > rows as f64 * NUMERIC_TEXT_SHARE {
                    numeric_text.push(name.clone());
                }
            }
            Some(ValueKind::Integer | ValueKind::Float) => {
                if outlier_count(table, index) as f64 > rows as f64 * OUTLIER_SHARE {
                    outlier_columns.push(name.clone());
                }
            }
            _ => {}
        }

        let texts: Vec<&str> = table.column(index).flatten().filter_map(Value::as_text).collect();
        if texts.iter().any(|t| has_whitespace_run(t)) {
            text_issues.push(format!("{}: excessive whitespace", name));
        }
        let special = texts.iter().filter(|t| has_special_chars(t)).count();
        if special as f64 > rows as f64 * SPECIAL_CHAR_SHARE {
            text_issues.push(format!("{}: many special characters", name));
        }
    }

    if !numeric_text.is_empty() {
        issues.push(format!("Numbers stored as text in columns: {}", numeric_text.join(", ")));
        recommendations.push("Convert numeric columns from text to numeric types".to_string());
    }
    if !outlier_columns.is_empty() {
        issues.push(format!("High outlier count in columns: {}", outlier_columns.join(", ")));
        recommendations.push("Review and potentially remove outliers".to_string());
    }
    if !text_issues.is_empty() {
        issues.extend(text_issues.iter().cloned());
        recommendations.push("Clean text data (extra spaces, special characters)".to_string());
    }

    let score = (100.0
        - missing_percentage.min(30.0)
        - duplicate_percentage.min(20.0)
        - 5.0 * numeric_text.len() as f64
        - 3.0 * outlier_columns.len() as f64
        - 2.0 * text_issues.len() as f64)
        .max(0.0);

    let verdict = if score < 60.0 {
        "Data quality is poor: significant cleaning required"
    } else if score < 80.0 {
        "Data quality is moderate: some cleaning recommended"
    } else {
        "Data quality is good: minimal cleaning needed"
    };
    recommendations.insert(0, verdict.to_string());

    tracing::info!("Data quality score: {:.1}/100", score);

    QualityReport {
        score,
        missing_percentage,
        duplicates,
        duplicate_percentage,
        issues,
        recommendations,
    }
}

/// Values outside 1.5 IQR of the column's quartiles
fn outlier_count(table: &Table, index: usize) -> usize {
    let values = sorted(numeric_values(table, index));
    if values.is_empty() {
        return 0;
    }
    let q1 = quantile(&values, 0.25);
    let q3 = quantile(&values, 0.75);
    let spread = q3 - q1;
    let (low, high) = (q1 - 1.5 * spread, q3 + 1.5 * spread);
    values.iter().filter(|&&x| x < low || x > high).count()
}

fn has_whitespace_run(text: &str) -> bool {
    let mut previous = false;
    text.chars().any(|c| {
        let run = previous && c.is_whitespace();
        previous = c.is_whitespace();
        run
    })
}

fn has_special_chars(text: &str) -> bool {
    text.chars()
        .any(|c| !(c.is_alphanumeric() || c == '_' || c.is_whitespace()))
}
