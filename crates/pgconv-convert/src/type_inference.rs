//! SQL column type inference
//!
//! Column types are inferred from a single sample value. Inference never
//! fails: anything without a better mapping gets [`DEFAULT_SQL_TYPE`].

use pgconv_core::{Row, SqlDialect, Value, ValueKind};

/// Type used for null samples and as the fallback
pub const DEFAULT_SQL_TYPE: &str = "VARCHAR(255)";

/// Fixed type for all fractional numbers, float and decimal alike
pub const DECIMAL_SQL_TYPE: &str = "DECIMAL(18, 6)";

const MAX_VARCHAR_LENGTH: usize = 255;

/// Infer the SQL column type for one sample value
pub fn infer_sql_type(value: &Value, dialect: SqlDialect) -> String {
    match value.kind() {
        ValueKind::Null => DEFAULT_SQL_TYPE.to_string(),
        ValueKind::Integer => "INT".to_string(),
        ValueKind::Float | ValueKind::Decimal => DECIMAL_SQL_TYPE.to_string(),
        ValueKind::Boolean => "BOOLEAN".to_string(),
        ValueKind::Date => "DATE".to_string(),
        ValueKind::DateTime => "DATETIME".to_string(),
        ValueKind::Binary => "BLOB".to_string(),
        ValueKind::Composite => dialect.json_column_type().to_string(),
        ValueKind::Text => match value.as_str() {
            Some(text) => varchar_for(text),
            None => DEFAULT_SQL_TYPE.to_string(),
        },
    }
}

/// `VARCHAR(n)` with twice the sample's character count as headroom,
/// clamped to `1..=255`
fn varchar_for(sample: &str) -> String {
    let length = (sample.chars().count() * 2).clamp(1, MAX_VARCHAR_LENGTH);
    format!("VARCHAR({})", length)
}

/// A column in a generated `CREATE TABLE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDeclaration {
    pub name: String,
    pub sql_type: String,
}

impl ColumnDeclaration {
    /// `<quoted name> <TYPE>`
    pub fn render(&self, dialect: SqlDialect) -> String {
        format!("{} {}", dialect.quote_identifier(&self.name), self.sql_type)
    }
}

/// Declare one column per key of the sample row, in key order
pub fn declare_columns(sample: &Row, dialect: SqlDialect) -> Vec<ColumnDeclaration> {
    sample
        .iter()
        .map(|(name, value)| ColumnDeclaration {
            name: name.to_string(),
            sql_type: infer_sql_type(value, dialect),
        })
        .collect()
}
