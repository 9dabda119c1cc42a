//! Cell values
//!
//! Scraped cells start out as text; `ConvertType` turns them into integers,
//! floats or booleans. An absent cell is `None` at the table level, never an
//! empty string.

use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A single present cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Text(String),
    Integer(i64),
    #[serde(serialize_with = "finite_float")]
    Float(f64),
    Boolean(bool),
}

/// JSON has no representation for NaN or infinity, so refuse to write them
fn finite_float<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if !value.is_finite() {
        return Err(S::Error::custom(format!(
            "cannot store non-finite float {}",
            value
        )));
    }
    serializer.serialize_f64(*value)
}

/// The type of a cell value, also the target of a type conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Text,
    Integer,
    Float,
    Boolean,
}

/// Hashable identity of a value, used for duplicate detection and mode counting
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKey {
    Text(String),
    Integer(i64),
    Float(u64),
    Boolean(bool),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Text(_) => ValueKind::Text,
            Self::Integer(_) => ValueKind::Integer,
            Self::Float(_) => ValueKind::Float,
            Self::Boolean(_) => ValueKind::Boolean,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric reading of the value; numeric-looking text counts
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) if f.is_finite() => Some(*f),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    pub fn key(&self) -> ValueKey {
        match self {
            Self::Text(s) => ValueKey::Text(s.clone()),
            Self::Integer(i) => ValueKey::Integer(*i),
            // -0.0 and 0.0 compare equal, so they must share a key
            Self::Float(f) if *f == 0.0 => ValueKey::Float(0.0f64.to_bits()),
            Self::Float(f) => ValueKey::Float(f.to_bits()),
            Self::Boolean(b) => ValueKey::Boolean(*b),
        }
    }

    /// Converts this value to `kind`; `None` when the value cannot be coerced
    pub fn convert(&self, kind: ValueKind) -> Option<Value> {
        match kind {
            ValueKind::Text => Some(Value::Text(self.to_string())),
            ValueKind::Integer => match self {
                Self::Integer(i) => Some(Value::Integer(*i)),
                Self::Float(f) => float_to_integer(*f),
                Self::Boolean(b) => Some(Value::Integer(i64::from(*b))),
                Self::Text(s) => {
                    let trimmed = s.trim();
                    trimmed
                        .parse::<i64>()
                        .ok()
                        .map(Value::Integer)
                        .or_else(|| trimmed.parse::<f64>().ok().and_then(float_to_integer))
                }
            },
            ValueKind::Float => self
                .as_f64()
                .or_else(|| match self {
                    Self::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
                    _ => None,
                })
                .map(Value::Float),
            ValueKind::Boolean => match self {
                Self::Boolean(b) => Some(Value::Boolean(*b)),
                Self::Integer(0) => Some(Value::Boolean(false)),
                Self::Integer(1) => Some(Value::Boolean(true)),
                Self::Text(s) => parse_bool(s).map(Value::Boolean),
                _ => None,
            },
        }
    }
}

/// Integral floats only; 12.5 is not an integer
fn float_to_integer(f: f64) -> Option<Value> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(Value::Integer(f as i64))
    } else {
        None
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{}", s),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
        };
        write!(f, "{}", name)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}
