//! Row sources
//!
//! A row source is the extraction half of a run: it materializes a whole
//! result set in memory and hands it to a converter. Failures here are
//! `ExtractionError`s, never `ConvertError`s.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};

use crate::{Dataset, ExtractionError, Row, Value};

/// Something that can produce datasets from queries or table names
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Human-readable source name, used in logs
    fn name(&self) -> &str;

    /// Run a query and collect every row
    async fn fetch_all(&self, query: &str) -> Result<Dataset, ExtractionError>;

    /// Fetch every row of a table
    async fn fetch_table(&self, table: &str) -> Result<Dataset, ExtractionError> {
        self.fetch_all(&format!("SELECT * FROM {}", quote_table_name(table)))
            .await
    }

    /// List the tables this source can read
    async fn list_tables(&self) -> Result<Vec<String>, ExtractionError>;
}

/// Quote a possibly schema-qualified table name with double quotes
pub fn quote_table_name(table_name: &str) -> String {
    fn quote(part: &str) -> String {
        format!("\"{}\"", part.replace('"', "\"\""))
    }

    match table_name.split_once('.') {
        Some((schema, table)) => format!("{}.{}", quote(schema), quote(table)),
        None => quote(table_name),
    }
}

/// Reads rows from a JSON file holding an array of objects
///
/// Objects of the form `{"$type": "...", "$value": ...}` carry values JSON has
/// no native type for; see [`decode_input_value`].
pub struct JsonFileSource {
    path: PathBuf,
    name: String,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("json:{}", path.display());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self) -> Result<Dataset, ExtractionError> {
        let text = std::fs::read_to_string(&self.path)?;
        let document: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ExtractionError::InvalidInput(format!("{}: {}", self.path.display(), e)))?;
        dataset_from_json(document)
    }

    /// The file stem doubles as the only table name
    fn table_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RowSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    /// The whole file is the result set; the query text is ignored
    async fn fetch_all(&self, query: &str) -> Result<Dataset, ExtractionError> {
        tracing::debug!(path = %self.path.display(), query = %query, "reading rows from JSON file");
        self.read_rows()
    }

    async fn fetch_table(&self, table: &str) -> Result<Dataset, ExtractionError> {
        if table != self.table_name() {
            return Err(ExtractionError::Query(format!(
                "table {} not found in {}",
                table,
                self.path.display()
            )));
        }
        self.read_rows()
    }

    async fn list_tables(&self) -> Result<Vec<String>, ExtractionError> {
        Ok(vec![self.table_name()])
    }
}

/// Build a dataset from a JSON array, rejecting elements that are not objects
pub fn dataset_from_json(document: serde_json::Value) -> Result<Dataset, ExtractionError> {
    let serde_json::Value::Array(items) = document else {
        return Err(ExtractionError::InvalidInput(
            "expected a JSON array of row objects".to_string(),
        ));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            serde_json::Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, decode_input_value(v)))
                .collect::<Row>()),
            other => Err(ExtractionError::InvalidInput(format!(
                "row {} is not an object (found {})",
                index,
                json_type_name(&other)
            ))),
        })
        .collect()
}

/// Decode one JSON input value into a `Value`
///
/// Tagged objects recognize `decimal`, `date`, `datetime`, `datetime_utc` and
/// `binary` (hex). An unrecognized or malformed tag leaves the object as JSON.
pub fn decode_input_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            // above i64::MAX: keep every digit
            None if n.is_u64() => Value::Decimal(n.to_string()),
            None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Object(map) => {
            if let Some(decoded) = decode_tagged(&map) {
                return decoded;
            }
            Value::Json(serde_json::Value::Object(map))
        }
        array @ serde_json::Value::Array(_) => Value::Json(array),
    }
}

fn decode_tagged(map: &serde_json::Map<String, serde_json::Value>) -> Option<Value> {
    if map.len() != 2 {
        return None;
    }
    let tag = map.get("$type")?.as_str()?;
    let raw = map.get("$value")?.as_str()?;
    match tag {
        "decimal" => Some(Value::Decimal(raw.to_string())),
        "date" => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(Value::Date),
        "datetime" => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(Value::DateTime),
        "datetime_utc" => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| Value::DateTimeUtc(dt.with_timezone(&Utc))),
        "binary" => hex::decode(raw).ok().map(Value::Bytes),
        _ => None,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
