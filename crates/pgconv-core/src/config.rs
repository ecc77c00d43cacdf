//! Converter configuration
//!
//! The configuration file is TOML. Every table and key is optional; missing
//! values take the defaults below.
//!
//! ```toml
//! [csv]
//! delimiter = ","
//! quotechar = "\""
//! encoding = "utf-8"
//!
//! [sql]
//! dialect = "mysql"
//! table_name = "users"
//! batch_size = 100
//! use_batch_insert = true
//!
//! [mongodb]
//! uri = "mongodb://localhost:27017"
//! database = "exports"
//! collection = "postgresql_data"
//! ```

use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{ConvertError, SqlDialect};

/// Top-level configuration consumed by the CLI and the converters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub csv: CsvOptions,
    pub sql: SqlOptions,
    pub mongodb: MongoOptions,
    pub postgresql: PostgresOptions,
    pub output: OutputOptions,
    pub logging: LoggingOptions,
}

impl ConverterConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConvertError> {
        toml::from_str(text).map_err(|e| ConvertError::Configuration(e.to_string()))
    }

    /// Load and parse a TOML file
    pub fn load(path: &Path) -> Result<Self, ConvertError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check the values that the converters cannot work with
    pub fn validate(&self) -> Result<(), ConvertError> {
        let delimiter = self.csv.delimiter_byte()?;
        let quote = self.csv.quote_byte()?;
        if delimiter == quote {
            return Err(ConvertError::Configuration(
                "csv.delimiter and csv.quotechar must differ".to_string(),
            ));
        }
        self.csv.text_encoding()?;
        if self.sql.batch_size == 0 {
            return Err(ConvertError::Configuration(
                "sql.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// `[csv]` options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    pub delimiter: String,
    pub quotechar: String,
    pub encoding: String,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
            quotechar: "\"".to_string(),
            encoding: "utf-8".to_string(),
        }
    }
}

impl CsvOptions {
    pub fn delimiter_byte(&self) -> Result<u8, ConvertError> {
        single_ascii_byte("csv.delimiter", &self.delimiter)
    }

    pub fn quote_byte(&self) -> Result<u8, ConvertError> {
        single_ascii_byte("csv.quotechar", &self.quotechar)
    }

    pub fn text_encoding(&self) -> Result<TextEncoding, ConvertError> {
        self.encoding.parse()
    }
}

fn single_ascii_byte(key: &str, value: &str) -> Result<u8, ConvertError> {
    match value.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(ConvertError::Configuration(format!(
            "{} must be a single ASCII character, got {:?}",
            key, value
        ))),
    }
}

/// Text encodings accepted for tabular-text output
///
/// `latin-1` means strict ISO-8859-1. WHATWG labels map `latin1` and
/// `iso-8859-1` to windows-1252, so those names are resolved here before
/// falling back to [`Encoding::for_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    /// UTF-8 with a leading byte-order mark
    Utf8Sig,
    Latin1,
    Ascii,
    /// Any other encoding `encoding_rs` can write, e.g. `windows-1252` or `shift_jis`
    Legacy(&'static Encoding),
}

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

impl TextEncoding {
    /// Encode `text`, failing when any character cannot be represented
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, ConvertError> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Utf8Sig => Ok([UTF8_BOM, text.as_bytes()].concat()),
            TextEncoding::Latin1 if encoding_rs::mem::is_str_latin1(text) => {
                Ok(encoding_rs::mem::encode_latin1_lossy(text).into_owned())
            }
            TextEncoding::Ascii if text.is_ascii() => Ok(text.as_bytes().to_vec()),
            TextEncoding::Latin1 | TextEncoding::Ascii => Err(self.unmappable(text)),
            TextEncoding::Legacy(encoding) => {
                let (bytes, _, had_unmappable) = encoding.encode(text);
                if had_unmappable {
                    return Err(self.unmappable(text));
                }
                Ok(bytes.into_owned())
            }
        }
    }

    fn unmappable(&self, text: &str) -> ConvertError {
        let offending = text.chars().find(|c| match self {
            TextEncoding::Latin1 => (*c as u32) > 0xFF,
            TextEncoding::Ascii => !c.is_ascii(),
            TextEncoding::Legacy(encoding) => encoding.encode(c.encode_utf8(&mut [0; 4])).2,
            TextEncoding::Utf8 | TextEncoding::Utf8Sig => false,
        });
        match offending {
            Some(c) => ConvertError::Encoding(format!(
                "character {:?} cannot be encoded as {}",
                c,
                self.name()
            )),
            None => ConvertError::Encoding(format!("text cannot be encoded as {}", self.name())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf8Sig => "utf-8-sig",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Ascii => "ascii",
            TextEncoding::Legacy(encoding) => encoding.name(),
        }
    }
}

impl FromStr for TextEncoding {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_lowercase();
        match label.replace('_', "-").as_str() {
            "utf-8-sig" | "utf8-sig" => return Ok(TextEncoding::Utf8Sig),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" | "l1" => {
                return Ok(TextEncoding::Latin1);
            }
            "ascii" | "us-ascii" => return Ok(TextEncoding::Ascii),
            _ => {}
        }
        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) if encoding == UTF_8 => Ok(TextEncoding::Utf8),
            // UTF-16 and the replacement encoding have no encoder of their own
            Some(encoding) if encoding.output_encoding() == encoding => {
                Ok(TextEncoding::Legacy(encoding))
            }
            _ => Err(ConvertError::Configuration(format!(
                "unsupported csv.encoding: {}",
                label
            ))),
        }
    }
}

/// `[sql]` options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlOptions {
    /// Dialect name; unknown names fall back to generic SQL
    pub dialect: String,
    /// Target table name; derived from the output file name when unset
    pub table_name: Option<String>,
    pub batch_size: usize,
    pub use_batch_insert: bool,
}

impl Default for SqlOptions {
    fn default() -> Self {
        Self {
            dialect: "mysql".to_string(),
            table_name: None,
            batch_size: 100,
            use_batch_insert: true,
        }
    }
}

impl SqlOptions {
    pub fn sql_dialect(&self) -> SqlDialect {
        SqlDialect::resolve(&self.dialect)
    }
}

/// `[mongodb]` options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoOptions {
    pub uri: String,
    pub database: Option<String>,
    pub collection: String,
}

impl Default for MongoOptions {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: None,
            collection: "postgresql_data".to_string(),
        }
    }
}

/// `[postgresql]` connection options for the row source
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresOptions {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub sslmode: String,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: None,
            sslmode: "prefer".to_string(),
        }
    }
}

impl std::fmt::Debug for PostgresOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("sslmode", &self.sslmode)
            .finish()
    }
}

/// `[output]` options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    pub output_dir: PathBuf,
    pub default_format: String,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            default_format: "json".to_string(),
        }
    }
}

/// `[logging]` options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    pub level: String,
    /// Log file; console-only logging when unset
    pub file: Option<PathBuf>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConverterConfig::default();
        assert_eq!(config.csv.delimiter, ",");
        assert_eq!(config.csv.quotechar, "\"");
        assert_eq!(config.csv.encoding, "utf-8");
        assert_eq!(config.sql.sql_dialect(), SqlDialect::MySql);
        assert_eq!(config.sql.batch_size, 100);
        assert!(config.sql.use_batch_insert);
        assert_eq!(config.mongodb.collection, "postgresql_data");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ConverterConfig::from_toml_str(
            r#"
            [csv]
            delimiter = ";"

            [sql]
            dialect = "postgresql"
            table_name = "accounts"
            "#,
        )
        .unwrap();
        assert_eq!(config.csv.delimiter_byte().unwrap(), b';');
        assert_eq!(config.csv.quote_byte().unwrap(), b'"');
        assert_eq!(config.sql.sql_dialect(), SqlDialect::PostgreSql);
        assert_eq!(config.sql.table_name.as_deref(), Some("accounts"));
        assert_eq!(config.sql.batch_size, 100);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ConverterConfig::default();
        config.csv.delimiter = "::".to_string();
        assert!(matches!(config.validate(), Err(ConvertError::Configuration(_))));

        let mut config = ConverterConfig::default();
        config.csv.quotechar = ",".to_string();
        assert!(config.validate().is_err());

        let mut config = ConverterConfig::default();
        config.sql.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = ConverterConfig::default();
        config.csv.encoding = "ebcdic".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_text_encodings() {
        assert_eq!("UTF8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert_eq!("iso-8859-1".parse::<TextEncoding>().unwrap(), TextEncoding::Latin1);

        let sig = TextEncoding::Utf8Sig.encode("a").unwrap();
        assert_eq!(sig, vec![0xEF, 0xBB, 0xBF, b'a']);

        assert_eq!(TextEncoding::Latin1.encode("café").unwrap(), vec![b'c', b'a', b'f', 0xE9]);
        assert!(TextEncoding::Latin1.encode("€").is_err());
        assert!(TextEncoding::Ascii.encode("café").is_err());
    }

    #[test]
    fn test_other_labels_go_through_encoding_rs() {
        let cp1252 = "windows-1252".parse::<TextEncoding>().unwrap();
        assert_eq!(cp1252, TextEncoding::Legacy(encoding_rs::WINDOWS_1252));
        assert_eq!(cp1252.name(), "windows-1252");
        assert_eq!(cp1252.encode("€5").unwrap(), vec![0x80, b'5']);

        let shift_jis = "Shift_JIS".parse::<TextEncoding>().unwrap();
        assert_eq!(shift_jis.encode("カ").unwrap(), vec![0x83, 0x4A]);

        let err = cp1252.encode("a→b").unwrap_err();
        assert!(matches!(&err, ConvertError::Encoding(m) if m.contains('→')), "{err}");

        assert!("utf-16le".parse::<TextEncoding>().is_err());
        assert_eq!("unicode-1-1-utf-8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
    }

    #[test]
    fn test_password_is_redacted_in_debug() {
        let options = PostgresOptions {
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", options);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
