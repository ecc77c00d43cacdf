//! Target SQL dialects
//!
//! A dialect decides identifier quoting, the boolean literal form, the binary
//! literal form and the column type used for nested (JSON) values. Anything we
//! do not recognize is rendered with the generic ANSI conventions.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// SQL dialect variants for generated scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// MySQL dialect
    #[default]
    MySql,
    /// MariaDB dialect (MySQL family)
    MariaDb,
    /// PostgreSQL dialect
    PostgreSql,
    /// Generic ANSI SQL (fallback)
    Generic,
}

/// Returned when a dialect name is not one we know
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown SQL dialect: {0}")]
pub struct UnknownDialect(pub String);

impl SqlDialect {
    /// Resolve a configured dialect name, falling back to `Generic` on unknown names
    pub fn resolve(name: &str) -> Self {
        match name.parse() {
            Ok(dialect) => dialect,
            Err(e) => {
                tracing::warn!(error = %e, "falling back to generic SQL dialect");
                SqlDialect::Generic
            }
        }
    }

    /// Get display name for this SQL dialect
    pub fn display_name(&self) -> &'static str {
        match self {
            SqlDialect::MySql => "MySQL",
            SqlDialect::MariaDb => "MariaDB",
            SqlDialect::PostgreSql => "PostgreSQL",
            SqlDialect::Generic => "ANSI SQL",
        }
    }

    /// MySQL and MariaDB share literal and quoting conventions
    pub fn is_mysql_family(&self) -> bool {
        matches!(self, SqlDialect::MySql | SqlDialect::MariaDb)
    }

    /// Quote an identifier, doubling any embedded quote character
    pub fn quote_identifier(&self, name: &str) -> String {
        if self.is_mysql_family() {
            format!("`{}`", name.replace('`', "``"))
        } else {
            format!("\"{}\"", name.replace('"', "\"\""))
        }
    }

    pub fn boolean_literal(&self, value: bool) -> &'static str {
        match (self.is_mysql_family(), value) {
            (true, true) => "1",
            (true, false) => "0",
            (false, true) => "TRUE",
            (false, false) => "FALSE",
        }
    }

    /// Literal for a byte sequence: `X'..'` for MySQL-family, `'\x..'` otherwise
    pub fn binary_literal(&self, bytes: &[u8]) -> String {
        let hex = hex::encode(bytes);
        if self.is_mysql_family() {
            format!("X'{}'", hex)
        } else {
            format!("'\\x{}'", hex)
        }
    }

    /// Column type for nested map/sequence values
    pub fn json_column_type(&self) -> &'static str {
        match self {
            SqlDialect::MySql | SqlDialect::MariaDb => "JSON",
            SqlDialect::PostgreSql => "JSONB",
            SqlDialect::Generic => "TEXT",
        }
    }
}

impl FromStr for SqlDialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Ok(SqlDialect::MySql),
            "mariadb" => Ok(SqlDialect::MariaDb),
            "postgresql" | "postgres" | "pg" => Ok(SqlDialect::PostgreSql),
            "generic" | "ansi" | "other" => Ok(SqlDialect::Generic),
            other => Err(UnknownDialect(other.to_string())),
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("mysql", SqlDialect::MySql)]
    #[case("MariaDB", SqlDialect::MariaDb)]
    #[case("postgresql", SqlDialect::PostgreSql)]
    #[case("postgres", SqlDialect::PostgreSql)]
    #[case("other", SqlDialect::Generic)]
    fn test_parse_known_dialects(#[case] name: &str, #[case] expected: SqlDialect) {
        assert_eq!(name.parse::<SqlDialect>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_dialect_falls_back_to_generic() {
        assert!("oracle".parse::<SqlDialect>().is_err());
        assert_eq!(SqlDialect::resolve("oracle"), SqlDialect::Generic);
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(SqlDialect::MySql.quote_identifier("users"), "`users`");
        assert_eq!(SqlDialect::MariaDb.quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(SqlDialect::PostgreSql.quote_identifier("users"), "\"users\"");
        assert_eq!(SqlDialect::Generic.quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_literals_per_dialect() {
        assert_eq!(SqlDialect::MySql.boolean_literal(true), "1");
        assert_eq!(SqlDialect::MariaDb.boolean_literal(false), "0");
        assert_eq!(SqlDialect::PostgreSql.boolean_literal(true), "TRUE");
        assert_eq!(SqlDialect::Generic.boolean_literal(false), "FALSE");

        assert_eq!(SqlDialect::MySql.binary_literal(&[0xde, 0xad]), "X'dead'");
        assert_eq!(SqlDialect::PostgreSql.binary_literal(&[0xbe, 0xef]), "'\\xbeef'");
    }

    #[test]
    fn test_json_column_type() {
        assert_eq!(SqlDialect::MySql.json_column_type(), "JSON");
        assert_eq!(SqlDialect::MariaDb.json_column_type(), "JSON");
        assert_eq!(SqlDialect::PostgreSql.json_column_type(), "JSONB");
        assert_eq!(SqlDialect::Generic.json_column_type(), "TEXT");
    }
}
