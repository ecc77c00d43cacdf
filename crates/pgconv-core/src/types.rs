//! Core value and row types

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A cell value as extracted from the source database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer (all integer widths widen to i64)
    Int(i64),
    /// Floating point
    Float(f64),
    /// Decimal/Numeric (stored as string for precision)
    Decimal(String),
    /// UTF-8 string
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Date without time of day
    Date(NaiveDate),
    /// DateTime without timezone
    DateTime(NaiveDateTime),
    /// DateTime with timezone (UTC)
    DateTimeUtc(DateTime<Utc>),
    /// Nested map or sequence, already in JSON form
    Json(serde_json::Value),
    /// Sequence of values
    Array(Vec<Value>),
}

/// The kind of a `Value`, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Integer,
    Float,
    Decimal,
    Boolean,
    /// Date-only temporal value
    Date,
    /// Temporal value with a time-of-day component
    DateTime,
    Binary,
    Composite,
    Text,
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Int(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Float,
            Value::Decimal(_) => ValueKind::Decimal,
            Value::String(_) => ValueKind::Text,
            Value::Bytes(_) => ValueKind::Binary,
            Value::Date(_) => ValueKind::Date,
            Value::DateTime(_) | Value::DateTimeUtc(_) => ValueKind::DateTime,
            Value::Json(_) | Value::Array(_) => ValueKind::Composite,
        }
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// ISO-8601 rendering of a temporal value
    ///
    /// Date-only values render as `YYYY-MM-DD`; naive datetimes as
    /// `YYYY-MM-DDTHH:MM:SS[.fff]`; UTC datetimes carry a `+00:00` offset.
    pub fn to_iso8601(&self) -> Option<String> {
        match self {
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => Some(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Value::DateTimeUtc(dt) => {
                Some(dt.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, false))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Date(_) | Value::DateTime(_) | Value::DateTimeUtc(_) => {
                write!(f, "{}", self.to_iso8601().unwrap_or_default())
            }
            Value::Json(v) => write!(f, "{}", v),
            Value::Array(v) => write!(f, "[{} items]", v.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One record of a result set: column name → value, in column order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    values: IndexMap<String, Value>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used heavily by tests and row sources
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Insert a value, returning the previous value stored under the same column
    pub fn insert(&mut self, column: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(column.into(), value)
    }

    /// Get a value by column name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Column names in order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// The full, in-memory result set handed to a converter
pub type Dataset = Vec<Row>;

/// Key-set difference between a row and the reference (first) row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDrift {
    /// Columns of the reference row that this row lacks
    pub missing: Vec<String>,
    /// Columns of this row that the reference row lacks
    pub extra: Vec<String>,
}

impl KeyDrift {
    /// Compare `row` against `reference`; `None` when the key sets are equal
    pub fn between(reference: &Row, row: &Row) -> Option<Self> {
        let missing: Vec<String> = reference
            .columns()
            .filter(|c| !row.contains_column(c))
            .map(str::to_string)
            .collect();
        let extra: Vec<String> = row
            .columns()
            .filter(|c| !reference.contains_column(c))
            .map(str::to_string)
            .collect();
        if missing.is_empty() && extra.is_empty() {
            None
        } else {
            Some(Self { missing, extra })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kinds() {
        assert_eq!(Value::Null.kind(), ValueKind::Null);
        assert_eq!(Value::Int(1).kind(), ValueKind::Integer);
        assert_eq!(Value::Decimal("1.5".into()).kind(), ValueKind::Decimal);
        assert_eq!(Value::Json(serde_json::json!({"a": 1})).kind(), ValueKind::Composite);
        assert_eq!(Value::Array(vec![]).kind(), ValueKind::Composite);
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(Value::Date(date).kind(), ValueKind::Date);
        let dt = date.and_hms_opt(8, 0, 0).unwrap();
        assert_eq!(Value::DateTime(dt).kind(), ValueKind::DateTime);
        assert_eq!(Value::DateTimeUtc(dt.and_utc()).kind(), ValueKind::DateTime);
    }

    #[test]
    fn test_iso8601_rendering() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        assert_eq!(Value::Date(date).to_iso8601().unwrap(), "2023-01-15");

        let dt = date.and_hms_opt(10, 30, 0).unwrap();
        assert_eq!(Value::DateTime(dt).to_iso8601().unwrap(), "2023-01-15T10:30:00");

        let with_millis = date.and_hms_milli_opt(10, 30, 0, 250).unwrap();
        assert_eq!(
            Value::DateTime(with_millis).to_iso8601().unwrap(),
            "2023-01-15T10:30:00.250"
        );

        assert_eq!(
            Value::DateTimeUtc(dt.and_utc()).to_iso8601().unwrap(),
            "2023-01-15T10:30:00+00:00"
        );
        assert_eq!(Value::Int(3).to_iso8601(), None);
    }

    #[test]
    fn test_row_preserves_insertion_order() {
        let row = Row::new().with("z", 1).with("a", 2).with("m", 3);
        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_row_option_into_null() {
        let row = Row::new().with("missing", None::<i64>);
        assert_eq!(row.get("missing"), Some(&Value::Null));
    }

    #[test]
    fn test_key_drift() {
        let first = Row::new().with("id", 1).with("name", "a");
        let same = Row::new().with("name", "b").with("id", 2);
        assert_eq!(KeyDrift::between(&first, &same), None);

        let other = Row::new().with("id", 3).with("email", "x@y");
        let drift = KeyDrift::between(&first, &other).unwrap();
        assert_eq!(drift.missing, vec!["name".to_string()]);
        assert_eq!(drift.extra, vec!["email".to_string()]);
    }
}
