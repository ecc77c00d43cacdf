//! Value normalization
//!
//! Maps each source [`Value`] to the representation a target format can hold.
//! The rules differ per format, so each format has its own function with an
//! exhaustive match over the value variants; adding a variant to `Value`
//! fails to compile here until every format handles it.
//!
//! | kind      | document        | document store              | tabular          | SQL                       |
//! |-----------|-----------------|-----------------------------|------------------|---------------------------|
//! | null      | `null`          | `null`                      | empty            | `NULL`                    |
//! | temporal  | ISO string      | `{"$date": iso}`            | ISO string       | quoted ISO string         |
//! | decimal   | float           | float                       | float text       | unquoted numeric literal  |
//! | binary    | hex string      | `{"$binary", "$type"}`      | hex string       | dialect hex literal       |
//! | composite | nested value    | nested value                | JSON text        | quoted JSON text          |
//! | boolean   | `true`/`false`  | `true`/`false`              | `true`/`false`   | dialect literal           |
//!
//! Decimals become binary floats in the non-SQL formats and may lose
//! precision there.

use pgconv_core::{SqlDialect, Value};
use serde_json::json;

/// BSON binary subtype for generic bytes, as written in extended JSON
pub const GENERIC_BINARY_SUBTYPE: &str = "00";

/// The representation family a value is normalized for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    /// Structured document (JSON)
    Document,
    /// Document store (MongoDB extended JSON)
    DocumentStore,
    /// Delimited tabular text (CSV)
    Tabular,
    /// SQL literal for the given dialect
    Sql(SqlDialect),
}

/// A value in its target-format representation
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedValue {
    Document(serde_json::Value),
    Text(String),
    SqlLiteral(String),
}

/// Normalize one value for `target`
pub fn normalize(value: &Value, target: TargetFormat) -> NormalizedValue {
    match target {
        TargetFormat::Document => NormalizedValue::Document(to_document_value(value)),
        TargetFormat::DocumentStore => NormalizedValue::Document(to_document_store_value(value)),
        TargetFormat::Tabular => NormalizedValue::Text(to_tabular_text(value)),
        TargetFormat::Sql(dialect) => NormalizedValue::SqlLiteral(to_sql_literal(value, dialect)),
    }
}

/// JSON representation for the structured-document format
pub fn to_document_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => json!(i),
        // NaN and infinities have no JSON number and become null
        Value::Float(f) => serde_json::Value::from(*f),
        Value::Decimal(s) => decimal_to_document(s),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::String(hex::encode(b)),
        Value::Date(_) | Value::DateTime(_) | Value::DateTimeUtc(_) => iso_string(value),
        Value::Json(j) => j.clone(),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_document_value).collect()),
    }
}

/// JSON representation for the document-store format, with `$date` and
/// `$binary` wrappers for the values plain JSON cannot type
pub fn to_document_store_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => json!(i),
        Value::Float(f) => serde_json::Value::from(*f),
        Value::Decimal(s) => decimal_to_document(s),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => json!({
            "$binary": hex::encode(b),
            "$type": GENERIC_BINARY_SUBTYPE,
        }),
        Value::Date(_) | Value::DateTime(_) | Value::DateTimeUtc(_) => {
            json!({ "$date": iso_string(value) })
        }
        Value::Json(j) => j.clone(),
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(to_document_store_value).collect())
        }
    }
}

/// Cell text for the tabular format; null is the empty string
pub fn to_tabular_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Decimal(s) => match decimal_to_f64(s) {
            Some(f) => f.to_string(),
            None => s.clone(),
        },
        Value::String(s) => s.clone(),
        Value::Bytes(b) => hex::encode(b),
        Value::Date(_) | Value::DateTime(_) | Value::DateTimeUtc(_) => {
            value.to_iso8601().unwrap_or_default()
        }
        Value::Json(j) => j.to_string(),
        Value::Array(_) => to_document_value(value).to_string(),
    }
}

/// SQL literal for `dialect`
///
/// NaN and infinities render as `NULL`; a decimal whose payload is not a
/// numeric literal renders as a quoted string. Callers that need to report
/// those cases check [`is_non_finite`] and [`is_invalid_decimal`].
pub fn to_sql_literal(value: &Value, dialect: SqlDialect) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => dialect.boolean_literal(*b).to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Float(_) => "NULL".to_string(),
        Value::Decimal(s) if is_numeric_literal(s) => s.trim().to_string(),
        Value::Decimal(s) => quote_sql_string(s, dialect),
        Value::String(s) => quote_sql_string(s, dialect),
        Value::Bytes(b) => dialect.binary_literal(b),
        Value::Date(_) | Value::DateTime(_) | Value::DateTimeUtc(_) => {
            quote_sql_string(&value.to_iso8601().unwrap_or_default(), dialect)
        }
        Value::Json(j) => quote_sql_string(&j.to_string(), dialect),
        Value::Array(_) => quote_sql_string(&to_document_value(value).to_string(), dialect),
    }
}

/// Quote a string literal, doubling single quotes
///
/// MySQL-family servers also treat backslash as an escape inside string
/// literals, so backslashes are doubled for those dialects.
pub fn quote_sql_string(text: &str, dialect: SqlDialect) -> String {
    let escaped = text.replace('\'', "''");
    if dialect.is_mysql_family() {
        format!("'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{}'", escaped)
    }
}

pub fn is_non_finite(value: &Value) -> bool {
    matches!(value, Value::Float(f) if !f.is_finite())
}

pub fn is_invalid_decimal(value: &Value) -> bool {
    matches!(value, Value::Decimal(s) if !is_numeric_literal(s))
}

/// Parse a decimal payload as a binary float
pub fn decimal_to_f64(text: &str) -> Option<f64> {
    if !is_numeric_literal(text) {
        return None;
    }
    text.trim().parse::<f64>().ok()
}

fn decimal_to_document(text: &str) -> serde_json::Value {
    match decimal_to_f64(text) {
        Some(f) => serde_json::Value::from(f),
        None => serde_json::Value::String(text.to_string()),
    }
}

fn iso_string(value: &Value) -> serde_json::Value {
    serde_json::Value::String(value.to_iso8601().unwrap_or_default())
}

/// `[+-]digits[.digits][e[+-]digits]`, with at least one digit in the mantissa
pub fn is_numeric_literal(text: &str) -> bool {
    let bytes = text.trim().as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }

    let mut mantissa_digits = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        mantissa_digits += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            mantissa_digits += 1;
        }
    }
    if mantissa_digits == 0 {
        return false;
    }

    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        i += 1;
        if i < bytes.len() && matches!(bytes[i], b'+' | b'-') {
            i += 1;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == start {
            return false;
        }
    }
    i == bytes.len()
}
