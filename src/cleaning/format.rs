//! Format standardization and encoding repair
//!
//! Both run cell by cell over one or more columns and, like every other
//! operation, build a new table instead of touching the input.

use super::apply::{map_column, require_column};
use super::operation::FormatKind;
use super::OperationError;
use crate::table::{Table, Value};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::fmt::Write;

const DEFAULT_PHONE_PATTERN: &str = r"^1?(\d{3})(\d{3})(\d{4})$";
const DEFAULT_PHONE_REPLACEMENT: &str = "($1) $2-$3";
const DEFAULT_DATE_LAYOUT: &str = "%Y-%m-%d";
const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

/// Characters stripped from amounts before parsing
const CURRENCY_NOISE: &[char] = &['$', '€', '£', '¥', ','];

const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Month-first for slashed dates, like most spreadsheet imports
const DATE_LAYOUTS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%Y%m%d",
];

/// UTF-8 punctuation and accents as they read after a Windows-1252 decode
///
/// Longer sequences come first: `â€` alone is a prefix of the quote forms.
const MOJIBAKE: &[(&str, &str)] = &[
    ("â€™", "'"),
    ("â€˜", "'"),
    ("â€œ", "\""),
    ("â€\u{9d}", "\""),
    ("â€“", "–"),
    ("â€”", "—"),
    ("â€¦", "…"),
    ("â€", "\""),
    ("Ã¡", "á"),
    ("Ã©", "é"),
    ("Ã\u{ad}", "í"),
    ("Ã³", "ó"),
    ("Ãº", "ú"),
    ("Ã±", "ñ"),
    ("Ã¨", "è"),
    ("Ã¼", "ü"),
    ("Ã¶", "ö"),
    ("Ã¤", "ä"),
    ("Ã§", "ç"),
    ("Â\u{a0}", " "),
];

/// Zero-width and format characters that never render
const INVISIBLE: &[char] = &[
    '\u{ad}', '\u{200b}', '\u{200c}', '\u{200d}', '\u{2060}', '\u{feff}', '\u{fffd}',
];

/// A validated `StandardizeFormat` rule, regexes compiled
#[derive(Debug)]
pub(super) enum FormatRule {
    Phone { regex: Regex, replacement: String },
    Date { layout: String },
    Currency { symbol: Option<String> },
    Email { valid: Regex },
    Pattern { regex: Regex, replacement: String },
}

impl FormatRule {
    /// Checks the rule's parameters and compiles what it needs
    pub(super) fn new(
        kind: FormatKind,
        pattern: Option<&str>,
        replacement: Option<&str>,
        layout: Option<&str>,
        symbol: Option<&str>,
    ) -> Result<Self, OperationError> {
        Ok(match kind {
            FormatKind::Phone => Self::Phone {
                regex: compile(pattern.unwrap_or(DEFAULT_PHONE_PATTERN))?,
                replacement: replacement.unwrap_or(DEFAULT_PHONE_REPLACEMENT).to_string(),
            },
            FormatKind::Date => {
                let layout = layout.unwrap_or(DEFAULT_DATE_LAYOUT);
                if StrftimeItems::new(layout).any(|item| matches!(item, Item::Error)) {
                    return Err(OperationError::InvalidParameter(format!(
                        "invalid date layout '{}'",
                        layout
                    )));
                }
                Self::Date {
                    layout: layout.to_string(),
                }
            }
            FormatKind::Currency => Self::Currency {
                symbol: symbol.map(str::to_string),
            },
            FormatKind::Email => Self::Email {
                valid: compile(EMAIL_PATTERN)?,
            },
            FormatKind::Pattern => {
                let pattern = pattern.ok_or_else(|| {
                    OperationError::InvalidParameter(
                        "the pattern format needs a pattern".to_string(),
                    )
                })?;
                Self::Pattern {
                    regex: compile(pattern)?,
                    replacement: replacement.unwrap_or_default().to_string(),
                }
            }
        })
    }

    /// The standardized form of one present cell
    fn rewrite(&self, value: &Value) -> Option<Value> {
        if matches!(value, Value::Boolean(_)) {
            return Some(value.clone());
        }
        let text = value.to_string();

        match self {
            Self::Phone { regex, replacement } => {
                let digits: String = text.chars().filter(char::is_ascii_digit).collect();
                Some(Value::Text(
                    regex.replace_all(&digits, replacement.as_str()).into_owned(),
                ))
            }
            Self::Date { layout } => {
                let parsed = parse_date(text.trim())?;
                let mut out = String::new();
                write!(out, "{}", parsed.format(layout)).ok()?;
                Some(Value::Text(out))
            }
            Self::Currency { symbol } => {
                let amount = match value {
                    Value::Text(_) => parse_amount(&text)?,
                    other => other.as_f64()?,
                };
                Some(match symbol {
                    Some(symbol) => Value::Text(format_currency(amount, symbol)),
                    None => Value::Float(amount),
                })
            }
            Self::Email { .. } => Some(Value::Text(text.trim().to_lowercase())),
            Self::Pattern { regex, replacement } => Some(Value::Text(
                regex.replace_all(&text, replacement.as_str()).into_owned(),
            )),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, OperationError> {
    Regex::new(pattern)
        .map_err(|e| OperationError::InvalidParameter(format!("invalid pattern: {}", e)))
}

fn parse_date(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.naive_local());
    }
    DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .or_else(|| {
            DATE_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDate::parse_from_str(text, layout).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !CURRENCY_NOISE.contains(c) && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// `1234.5` with symbol `$` becomes `$1,234.50`
fn format_currency(amount: f64, symbol: &str) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}{}.{}", sign, symbol, grouped, cents)
}

/// Applies a format rule to every present cell of `column`
pub(super) fn standardize_format(
    table: &Table,
    column: &str,
    rule: &FormatRule,
) -> Result<Table, OperationError> {
    let index = require_column(table, column)?;
    let result = map_column(table, index, |_, cell| {
        cell.as_ref().and_then(|value| rule.rewrite(value))
    });

    if let FormatRule::Email { valid } = rule {
        let invalid = result
            .column(index)
            .flatten()
            .filter_map(Value::as_text)
            .filter(|text| !valid.is_match(text))
            .count();
        if invalid > 0 {
            tracing::warn!("Found {} invalid email addresses in '{}'", invalid, column);
        }
    }

    Ok(result)
}

/// Repairs mis-decoded text cells in `columns` (every column holding text when empty)
pub(super) fn fix_encoding(table: &Table, columns: &[String]) -> Result<Table, OperationError> {
    let indices: Vec<usize> = if columns.is_empty() {
        (0..table.column_count())
            .filter(|&i| table.column(i).flatten().any(|v| v.as_text().is_some()))
            .collect()
    } else {
        columns
            .iter()
            .map(|c| require_column(table, c))
            .collect::<Result<_, _>>()?
    };

    let mut result = table.clone();
    for index in indices {
        result = map_column(&result, index, |_, cell| match cell {
            Some(Value::Text(text)) => Some(Value::Text(repair_text(text))),
            other => other.clone(),
        });

        let repaired = table
            .column(index)
            .zip(result.column(index))
            .filter(|(before, after)| before != after)
            .count();
        if repaired > 0 {
            tracing::debug!(
                "Repaired encoding in {} cells of '{}'",
                repaired,
                table.columns()[index]
            );
        }
    }

    Ok(result)
}

/// Undoes Windows-1252 mojibake, turns control whitespace into spaces and
/// drops other non-printing characters
fn repair_text(text: &str) -> String {
    let mut repaired = text.to_string();
    for (bad, good) in MOJIBAKE {
        if repaired.contains(bad) {
            repaired = repaired.replace(bad, good);
        }
    }

    repaired
        .chars()
        .filter_map(|c| match c {
            '\t' | '\n' | '\r' => Some(' '),
            c if c.is_control() || INVISIBLE.contains(&c) => None,
            c => Some(c),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaning::{apply, Operation};

    fn column_table(values: &[Option<Value>]) -> Table {
        let mut table = Table::with_columns(["v"]);
        for value in values {
            table.push_row(vec![value.clone()]);
        }
        table
    }

    fn text(s: &str) -> Option<Value> {
        Some(Value::Text(s.to_string()))
    }

    fn standardize(format: FormatKind) -> Operation {
        Operation::StandardizeFormat {
            column: "v".to_string(),
            format,
            pattern: None,
            replacement: None,
            layout: None,
            symbol: None,
        }
    }

    fn cells(table: &Table) -> Vec<Option<Value>> {
        table.column(0).map(|c| c.cloned()).collect()
    }

    #[test]
    fn test_phone_numbers() {
        let table = column_table(&[
            text("555.123.4567"),
            text("+1 (555) 987-6543"),
            Some(Value::Integer(5550001111)),
            text("12-34"),
            None,
        ]);
        let result = apply(&table, &standardize(FormatKind::Phone)).unwrap();

        assert_eq!(
            cells(&result.table),
            vec![
                text("(555) 123-4567"),
                text("(555) 987-6543"),
                text("(555) 000-1111"),
                text("1234"),
                None,
            ]
        );
        assert_eq!(result.diff.cells_changed, 4);
    }

    #[test]
    fn test_dates_with_layout() {
        let table = column_table(&[
            text("2024-03-05"),
            text("03/05/2024"),
            text("March 5, 2024"),
            text("2024-03-05T10:30:00Z"),
            text("next tuesday"),
        ]);
        let op = Operation::StandardizeFormat {
            column: "v".to_string(),
            format: FormatKind::Date,
            pattern: None,
            replacement: None,
            layout: Some("%d/%m/%Y".to_string()),
            symbol: None,
        };
        let result = apply(&table, &op).unwrap().table;

        assert_eq!(
            cells(&result),
            vec![
                text("05/03/2024"),
                text("05/03/2024"),
                text("05/03/2024"),
                text("05/03/2024"),
                None,
            ]
        );
    }

    #[test]
    fn test_invalid_date_layout_is_rejected() {
        let op = Operation::StandardizeFormat {
            column: "v".to_string(),
            format: FormatKind::Date,
            pattern: None,
            replacement: None,
            layout: Some("%Y-%Q".to_string()),
            symbol: None,
        };
        assert!(matches!(
            apply(&column_table(&[text("2024-01-01")]), &op),
            Err(OperationError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_currency_amounts() {
        let table = column_table(&[
            text("$1,234.50"),
            text("€ 99"),
            Some(Value::Integer(7)),
            text("call us"),
        ]);

        let plain = apply(&table, &standardize(FormatKind::Currency)).unwrap().table;
        assert_eq!(
            cells(&plain),
            vec![
                Some(Value::Float(1234.5)),
                Some(Value::Float(99.0)),
                Some(Value::Float(7.0)),
                None,
            ]
        );

        let op = Operation::StandardizeFormat {
            column: "v".to_string(),
            format: FormatKind::Currency,
            pattern: None,
            replacement: None,
            layout: None,
            symbol: Some("£".to_string()),
        };
        let labelled = apply(&table, &op).unwrap().table;
        assert_eq!(labelled.get(0, "v"), Some(&Value::from("£1,234.50")));
        assert_eq!(labelled.get(2, "v"), Some(&Value::from("£7.00")));
    }

    #[test]
    fn test_format_currency_grouping() {
        assert_eq!(format_currency(0.0, "$"), "$0.00");
        assert_eq!(format_currency(999.999, "$"), "$1,000.00");
        assert_eq!(format_currency(1234567.891, "$"), "$1,234,567.89");
        assert_eq!(format_currency(-42.5, "$"), "-$42.50");
    }

    #[test]
    fn test_email_and_pattern() {
        let table = column_table(&[text("  Ann@Example.COM "), text("not-an-email")]);
        let emails = apply(&table, &standardize(FormatKind::Email)).unwrap().table;
        assert_eq!(
            cells(&emails),
            vec![text("ann@example.com"), text("not-an-email")]
        );

        let op = Operation::StandardizeFormat {
            column: "v".to_string(),
            format: FormatKind::Pattern,
            pattern: Some(r"@.*$".to_string()),
            replacement: Some("@redacted".to_string()),
            layout: None,
            symbol: None,
        };
        let redacted = apply(&emails, &op).unwrap().table;
        assert_eq!(redacted.get(0, "v"), Some(&Value::from("ann@redacted")));
        assert_eq!(redacted.get(1, "v"), Some(&Value::from("not-an-email")));

        assert!(matches!(
            apply(&table, &standardize(FormatKind::Pattern)),
            Err(OperationError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_fix_encoding() {
        let mut table = Table::with_columns(["quote", "count"]);
        table.push_row(vec![
            text("Itâ€™s a cafÃ© â€œspecialâ€\u{9d}\u{200b}"),
            Some(Value::Integer(1)),
        ]);
        table.push_row(vec![text("line one\nline two\u{7}"), None]);
        table.push_row(vec![text("fine"), Some(Value::Integer(2))]);

        let result = apply(&table, &Operation::FixEncoding { columns: Vec::new() }).unwrap();

        assert_eq!(
            result.table.get(0, "quote"),
            Some(&Value::from("It's a café \"special\""))
        );
        assert_eq!(
            result.table.get(1, "quote"),
            Some(&Value::from("line one line two"))
        );
        assert_eq!(result.table.get(0, "count"), Some(&Value::Integer(1)));
        assert_eq!(result.diff.cells_changed, 2);

        assert!(matches!(
            apply(
                &table,
                &Operation::FixEncoding {
                    columns: vec!["missing".to_string()]
                }
            ),
            Err(OperationError::ColumnNotFound(_))
        ));
    }
}
