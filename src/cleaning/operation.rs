use crate::table::{Table, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One transformation over a table
///
/// Operations are plain data: applying the same operation to the same table
/// always yields the same result. `Custom` wraps a caller-supplied pure function
/// and is the only variant that cannot be serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Operation {
    /// Drops repeated rows, comparing `columns` (all columns when empty)
    RemoveDuplicates {
        #[serde(default)]
        strategy: DuplicateStrategy,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        columns: Vec<String>,
    },

    /// Fills absent cells in `column`
    FillMissing {
        strategy: FillStrategy,
        column: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },

    /// Drops rows with an absent cell in any of `columns` (any column when empty)
    DropMissing {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        columns: Vec<String>,
    },

    /// Converts every present cell of `column` to `target`
    ///
    /// Lenient mode turns unconvertible cells into absent cells; strict mode
    /// fails on the first one.
    ConvertType {
        column: String,
        target: ValueKind,
        #[serde(default)]
        strict: bool,
    },

    RenameColumn { from: String, to: String },

    /// Moves the listed columns to the front; the rest keep their relative order
    ReorderColumns { order: Vec<String> },

    RemoveOutliers {
        method: OutlierMethod,
        column: String,
        /// IQR multiplier or z-score limit; defaults to 1.5 and 3.0
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold: Option<f64>,
    },

    TrimText { column: String },

    CleanText { column: String, steps: Vec<TextStep> },

    /// Rewrites every present cell of `column` into one canonical format
    ///
    /// Cells that cannot be read as the format become absent for `date` and
    /// `currency`; `phone`, `email` and `pattern` always produce text.
    StandardizeFormat {
        column: String,
        format: FormatKind,
        /// Regex matched against the digits for `phone`, required for `pattern`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        /// Replacement for `phone` and `pattern`, with `$1`-style groups
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replacement: Option<String>,
        /// strftime layout for `date`; defaults to `%Y-%m-%d`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        layout: Option<String>,
        /// Currency symbol; when set, `currency` cells become text like `$1,234.50`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        symbol: Option<String>,
    },

    /// Repairs UTF-8 text that was decoded as Windows-1252 and drops invisible characters
    FixEncoding {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        columns: Vec<String>,
    },

    #[serde(skip)]
    Custom { name: String, func: CustomFn },
}

/// Which occurrence of a duplicated row survives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStrategy {
    #[default]
    First,
    Last,
    /// No occurrence survives
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    Value,
    Mean,
    Median,
    Mode,
    ForwardFill,
    BackwardFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    Iqr,
    Zscore,
}

/// A text cleaning step, applied in the order given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextStep {
    Lowercase,
    Uppercase,
    TitleCase,
    RemoveSpecialChars,
    RemoveNumbers,
    RemoveHtmlTags,
    NormalizeWhitespace,
}

/// Canonical formats for `Operation::StandardizeFormat`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// Digits only, then `(555) 123-4567` for ten-digit numbers
    Phone,
    Date,
    /// Symbols and separators stripped, leaving a number
    Currency,
    /// Trimmed and lower-cased
    Email,
    /// A caller-supplied regex replacement
    Pattern,
}

/// A pure table-to-table function for `Operation::Custom`
#[derive(Clone)]
pub struct CustomFn(Arc<dyn Fn(&Table) -> Table + Send + Sync>);

impl CustomFn {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Table) -> Table + Send + Sync + 'static,
    {
        Self(Arc::new(func))
    }

    pub fn call(&self, table: &Table) -> Table {
        (self.0)(table)
    }
}

impl fmt::Debug for CustomFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomFn(..)")
    }
}

impl Operation {
    /// Wraps a pure function as a named operation
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Table) -> Table + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            func: CustomFn::new(func),
        }
    }

    /// Short machine-style name, as used in configuration files
    pub fn name(&self) -> &str {
        match self {
            Self::RemoveDuplicates { .. } => "remove-duplicates",
            Self::FillMissing { .. } => "fill-missing",
            Self::DropMissing { .. } => "drop-missing",
            Self::ConvertType { .. } => "convert-type",
            Self::RenameColumn { .. } => "rename-column",
            Self::ReorderColumns { .. } => "reorder-columns",
            Self::RemoveOutliers { .. } => "remove-outliers",
            Self::TrimText { .. } => "trim-text",
            Self::CleanText { .. } => "clean-text",
            Self::StandardizeFormat { .. } => "standardize-format",
            Self::FixEncoding { .. } => "fix-encoding",
            Self::Custom { name, .. } => name,
        }
    }

    /// Human-readable description for history listings
    pub fn describe(&self) -> String {
        match self {
            Self::RemoveDuplicates { strategy, columns } => {
                format!("remove duplicates (keep {:?}) on {}", strategy, column_list(columns))
            }
            Self::FillMissing {
                strategy,
                column,
                value,
            } => match (strategy, value) {
                (FillStrategy::Value, Some(v)) => format!("fill missing in '{}' with '{}'", column, v),
                _ => format!("fill missing in '{}' by {:?}", column, strategy),
            },
            Self::DropMissing { columns } => {
                format!("drop rows missing {}", column_list(columns))
            }
            Self::ConvertType {
                column,
                target,
                strict,
            } => format!(
                "convert '{}' to {}{}",
                column,
                target,
                if *strict { " (strict)" } else { "" }
            ),
            Self::RenameColumn { from, to } => format!("rename '{}' to '{}'", from, to),
            Self::ReorderColumns { order } => format!("move {} to the front", order.join(", ")),
            Self::RemoveOutliers {
                method,
                column,
                threshold,
            } => format!(
                "remove {:?} outliers in '{}' (threshold {})",
                method,
                column,
                threshold.unwrap_or_else(|| method.default_threshold())
            ),
            Self::TrimText { column } => format!("trim text in '{}'", column),
            Self::CleanText { column, steps } => format!(
                "clean text in '{}': {}",
                column,
                steps
                    .iter()
                    .map(|s| format!("{:?}", s))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::StandardizeFormat { column, format, .. } => {
                format!("standardize '{}' as {:?}", column, format)
            }
            Self::FixEncoding { columns } => {
                format!("fix text encoding in {}", column_list(columns))
            }
            Self::Custom { name, .. } => format!("custom operation '{}'", name),
        }
    }
}

impl OutlierMethod {
    pub fn default_threshold(&self) -> f64 {
        match self {
            Self::Iqr => 1.5,
            Self::Zscore => 3.0,
        }
    }
}

fn column_list(columns: &[String]) -> String {
    if columns.is_empty() {
        "all columns".to_string()
    } else {
        columns.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operations_parse_from_toml() {
        #[derive(Deserialize)]
        struct Pipeline {
            cleaning: Vec<Operation>,
        }

        let content = r#"
[[cleaning]]
op = "convert-type"
column = "price"
target = "float"

[[cleaning]]
op = "fill-missing"
strategy = "forward_fill"
column = "region"

[[cleaning]]
op = "clean-text"
column = "title"
steps = ["remove_html_tags", "normalize_whitespace", "title_case"]

[[cleaning]]
op = "standardize-format"
column = "listed"
format = "date"
layout = "%d/%m/%Y"

[[cleaning]]
op = "fix-encoding"
"#;
        let pipeline: Pipeline = toml::from_str(content).unwrap();

        assert!(matches!(
            pipeline.cleaning[0],
            Operation::ConvertType {
                target: ValueKind::Float,
                strict: false,
                ..
            }
        ));
        assert!(matches!(
            pipeline.cleaning[1],
            Operation::FillMissing {
                strategy: FillStrategy::ForwardFill,
                value: None,
                ..
            }
        ));
        match &pipeline.cleaning[2] {
            Operation::CleanText { steps, .. } => assert_eq!(steps.len(), 3),
            other => panic!("unexpected operation {:?}", other),
        }
        match &pipeline.cleaning[3] {
            Operation::StandardizeFormat {
                format: FormatKind::Date,
                layout,
                pattern: None,
                ..
            } => assert_eq!(layout.as_deref(), Some("%d/%m/%Y")),
            other => panic!("unexpected operation {:?}", other),
        }
        assert!(matches!(
            &pipeline.cleaning[4],
            Operation::FixEncoding { columns } if columns.is_empty()
        ));
    }

    #[test]
    fn test_custom_cannot_be_serialized() {
        let op = Operation::custom("noop", |t: &Table| t.clone());
        assert!(serde_json::to_string(&op).is_err());
        assert_eq!(op.name(), "noop");
    }

    #[test]
    fn test_json_uses_op_tag() {
        let op = Operation::RenameColumn {
            from: "a".to_string(),
            to: "b".to_string(),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "rename-column");
        assert_eq!(json["from"], "a");
    }
}
