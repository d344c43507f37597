use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Declared type of a value, a function parameter or a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueType {
    Any,
    Bool,
    Int,
    Float,
    Text,
    Date,
    Timestamp,
    List(Box<ValueType>),
}

impl ValueType {
    pub fn list_of(element: ValueType) -> Self {
        ValueType::List(Box::new(element))
    }

    pub fn element(&self) -> Option<&ValueType> {
        match self {
            ValueType::List(element) => Some(element),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => f.write_str("any"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::Int => f.write_str("int"),
            ValueType::Float => f.write_str("float"),
            ValueType::Text => f.write_str("text"),
            ValueType::Date => f.write_str("date"),
            ValueType::Timestamp => f.write_str("timestamp"),
            ValueType::List(element) => write!(f, "list<{element}>"),
        }
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        if let Some(inner) = normalized
            .strip_prefix("list<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return inner.parse().map(ValueType::list_of);
        }
        match normalized.as_str() {
            "any" | "object" => Ok(ValueType::Any),
            "bool" | "boolean" => Ok(ValueType::Bool),
            "int" | "integer" | "long" | "bigint" | "smallint" => Ok(ValueType::Int),
            "float" | "double" | "decimal" | "numeric" | "real" => Ok(ValueType::Float),
            "text" | "string" | "varchar" | "char" => Ok(ValueType::Text),
            "date" => Ok(ValueType::Date),
            "timestamp" | "datetime" => Ok(ValueType::Timestamp),
            _ => Err(format!("unknown value type '{value}'")),
        }
    }
}

impl TryFrom<String> for ValueType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ValueType> for String {
    fn from(value: ValueType) -> Self {
        value.to_string()
    }
}

/// Runtime value flowing through plans, exclusions and SQL bindings.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Runtime type of the value. `Null` reports `any`.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Any,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Text(_) => ValueType::Text,
            Value::Date(_) => ValueType::Date,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::List(items) => ValueType::list_of(
                items
                    .iter()
                    .find(|item| !item.is_null())
                    .map(Value::value_type)
                    .unwrap_or(ValueType::Any),
            ),
        }
    }

    /// Text rendering used for comparisons; `None` for `Null`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(value) => Some(*value),
            Value::Timestamp(value) => Some(value.date()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Build a value from a JSON literal found in a policy document.
    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(*value),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(value) => Value::Int(value),
                None => Value::Float(number.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(value) => Value::Text(value.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(_) => Value::Text(value.to_string()),
        }
    }

    /// Truncate text values to at most `max_chars` characters.
    pub fn truncated(self, max_chars: usize) -> Value {
        match self {
            Value::Text(value) if value.chars().count() > max_chars => {
                Value::Text(value.chars().take(max_chars).collect())
            }
            other => other,
        }
    }
}

/// Renders values the way PostgreSQL's text output does, so in-process
/// comparisons agree with `CAST(column AS TEXT)`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write_float(f, *value),
            Value::Text(value) => f.write_str(value),
            Value::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Value::Timestamp(value) => {
                write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S"))?;
                let micros = value.nanosecond() % 1_000_000_000 / 1_000;
                if micros > 0 {
                    write!(f, ".{}", format!("{micros:06}").trim_end_matches('0'))?;
                }
                Ok(())
            }
            Value::List(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Shortest round-trip digits; exponent form below 1e-4 and from 1e15 up,
/// with at least two exponent digits.
fn write_float(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value.is_nan() {
        return f.write_str("NaN");
    }
    if value.is_infinite() {
        return f.write_str(if value > 0.0 { "Infinity" } else { "-Infinity" });
    }
    let scientific = format!("{value:e}");
    let (mantissa, exponent) = scientific
        .split_once('e')
        .and_then(|(mantissa, exponent)| Some((mantissa, exponent.parse::<i32>().ok()?)))
        .unwrap_or((scientific.as_str(), 0));
    if (-4..15).contains(&exponent) {
        write!(f, "{value}")
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        write!(f, "{mantissa}e{sign}{:02}", exponent.abs())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
