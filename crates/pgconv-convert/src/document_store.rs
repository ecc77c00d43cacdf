//! Document-store (MongoDB) output
//!
//! A connection-string sink bulk-inserts the rows into a collection; a path
//! sink writes them as an extended-JSON array instead. Top-level keys are made
//! safe for document stores either way (see [`sanitize_document_key`]).

use async_trait::async_trait;
use bson::{Bson, Document, spec::BinarySubtype};
use mongodb::{Client, Collection, options::ClientOptions};
use std::borrow::Cow;
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

use pgconv_core::{ConvertError, MongoOptions, Result, Row, Value};

use crate::converter::{
    ConversionReport, ConvertPhase, FormatPipeline, LARGE_DATASET_THRESHOLD, OutputFormat,
    ProgressCallback, ProgressLevel, ProgressReporter, SanitizedRows, rename_columns,
};
use crate::json_export::{rows_to_documents, write_document_array};
use crate::normalize::{decimal_to_f64, to_document_store_value};
use crate::sink::{SinkDescriptor, redact_uri};

/// Rows per insert call once a dataset exceeds [`LARGE_DATASET_THRESHOLD`]
pub const INSERT_BATCH_SIZE: usize = 500;

/// Failure reported by a document store
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// A collection that accepts bulk inserts
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert every document, returning how many were stored
    async fn insert_many(&self, documents: Vec<Document>) -> std::result::Result<u64, StoreError>;
}

/// A MongoDB collection
pub struct MongoDocumentStore {
    collection: Collection<Document>,
}

impl MongoDocumentStore {
    /// Connect to `uri` and open `collection`
    ///
    /// The database is `database` when given, else the default database named
    /// in the URI path.
    #[tracing::instrument(skip(uri), fields(target = %redact_uri(uri)))]
    pub async fn connect(
        uri: &str,
        database: Option<&str>,
        collection: &str,
    ) -> std::result::Result<Self, StoreError> {
        tracing::debug!("connecting to MongoDB");

        let options = ClientOptions::parse(uri)
            .await
            .map_err(|e| StoreError(format!("Failed to parse MongoDB options: {}", e)))?;
        let database = database
            .map(str::to_string)
            .or_else(|| options.default_database.clone())
            .ok_or_else(|| {
                StoreError("no database configured: set mongodb.database or name one in the URI".to_string())
            })?;

        let client = Client::with_options(options)
            .map_err(|e| StoreError(format!("Failed to create MongoDB client: {}", e)))?;

        Ok(Self {
            collection: client.database(&database).collection(collection),
        })
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn insert_many(&self, documents: Vec<Document>) -> std::result::Result<u64, StoreError> {
        let result = self
            .collection
            .insert_many(documents)
            .await
            .map_err(|e| StoreError(e.to_string()))?;
        Ok(result.inserted_ids.len() as u64)
    }
}

/// Make a top-level key safe for a document store
///
/// Dots become underscores and a leading digit gets a `_` prefix. Applying it
/// twice gives the same result as applying it once.
pub fn sanitize_document_key(key: &str) -> Cow<'_, str> {
    let starts_with_digit = key.chars().next().is_some_and(|c| c.is_ascii_digit());
    if !starts_with_digit && !key.contains('.') {
        return Cow::Borrowed(key);
    }
    let replaced = key.replace('.', "_");
    if starts_with_digit {
        Cow::Owned(format!("_{}", replaced))
    } else {
        Cow::Owned(replaced)
    }
}

/// Native BSON for a value, used for bulk inserts
pub fn to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Int(i) => match i32::try_from(*i) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(*i),
        },
        Value::Float(f) => Bson::Double(*f),
        Value::Decimal(s) => match decimal_to_f64(s) {
            Some(f) => Bson::Double(f),
            None => Bson::String(s.clone()),
        },
        Value::String(s) => Bson::String(s.clone()),
        Value::Bytes(b) => Bson::Binary(bson::Binary {
            subtype: BinarySubtype::Generic,
            bytes: b.clone(),
        }),
        Value::Date(d) => Bson::DateTime(bson::DateTime::from_millis(
            d.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis(),
        )),
        Value::DateTime(dt) => {
            Bson::DateTime(bson::DateTime::from_millis(dt.and_utc().timestamp_millis()))
        }
        Value::DateTimeUtc(dt) => Bson::DateTime(bson::DateTime::from_millis(dt.timestamp_millis())),
        Value::Json(j) => bson::to_bson(j).unwrap_or_else(|_| Bson::String(j.to_string())),
        Value::Array(items) => Bson::Array(items.iter().map(to_bson).collect()),
    }
}

/// One BSON document per row, keys in column order
pub fn row_to_document(row: &Row) -> Document {
    row.iter()
        .map(|(column, value)| (column.to_string(), to_bson(value)))
        .collect()
}

/// Row ranges for each insert call: one call for small datasets, fixed-size
/// batches once the dataset exceeds the threshold, none when empty
pub fn insert_batches(total: usize) -> Vec<Range<usize>> {
    if total == 0 {
        return Vec::new();
    }
    if total <= LARGE_DATASET_THRESHOLD {
        return vec![0..total];
    }
    (0..total)
        .step_by(INSERT_BATCH_SIZE)
        .map(|start| start..(start + INSERT_BATCH_SIZE).min(total))
        .collect()
}

/// Writes rows to a MongoDB collection or an extended-JSON file
pub struct MongoDbConverter {
    options: MongoOptions,
    store: Option<Arc<dyn DocumentStore>>,
    reporter: ProgressReporter,
}

impl MongoDbConverter {
    pub fn new(options: MongoOptions) -> Self {
        Self {
            options,
            store: None,
            reporter: ProgressReporter::new(OutputFormat::MongoDb),
        }
    }

    /// Insert through `store` instead of connecting to the sink URI
    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set progress callback
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.reporter.set_callback(callback);
        self
    }

    /// The sink URI, or the configured URI when the sink names no host
    fn effective_uri<'a>(&'a self, sink_uri: &'a str) -> &'a str {
        let host = sink_uri
            .split_once("://")
            .map(|(_, rest)| rest.split('/').next().unwrap_or_default())
            .unwrap_or_default();
        if host.is_empty() {
            &self.options.uri
        } else {
            sink_uri
        }
    }

    async fn open_store(&self, sink_uri: &str) -> Result<Arc<dyn DocumentStore>> {
        if let Some(store) = &self.store {
            return Ok(store.clone());
        }
        let store = MongoDocumentStore::connect(
            self.effective_uri(sink_uri),
            self.options.database.as_deref(),
            &self.options.collection,
        )
        .await
        .map_err(|e| ConvertError::Configuration(e.to_string()))?;
        Ok(Arc::new(store))
    }

    /// Insert `rows` in order, one call per batch; stops at the first failure
    pub async fn bulk_insert(
        &self,
        store: &dyn DocumentStore,
        rows: &[Row],
    ) -> Result<ConversionReport> {
        let mut report = ConversionReport::new(OutputFormat::MongoDb);
        let total = rows.len() as u64;

        let batches = insert_batches(rows.len());
        let batch_count = batches.len();
        for (index, range) in batches.into_iter().enumerate() {
            let documents: Vec<Document> = rows[range].iter().map(row_to_document).collect();
            let size = documents.len();

            let inserted = store.insert_many(documents).await.map_err(|e| {
                ConvertError::BulkInsert {
                    batch: index + 1,
                    message: e.to_string(),
                }
            })?;
            report.rows += inserted;
            report.batches += 1;

            self.reporter.report(
                ConvertPhase::Inserting,
                ProgressLevel::Info,
                report.rows,
                total,
                format!("Inserted batch {}/{} ({} documents)", index + 1, batch_count, size),
            );
        }

        tracing::info!(
            collection = %self.options.collection,
            documents = report.rows,
            batches = report.batches,
            "bulk insert finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl FormatPipeline for MongoDbConverter {
    type Prepared = SanitizedRows;

    fn output_format(&self) -> OutputFormat {
        OutputFormat::MongoDb
    }

    fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    fn preprocess(&self, dataset: &[Row]) -> Result<Self::Prepared> {
        Ok(rename_columns(dataset, &self.reporter, |key| {
            sanitize_document_key(key).into_owned()
        }))
    }

    async fn render(
        &self,
        prepared: Self::Prepared,
        sink: &SinkDescriptor,
    ) -> Result<ConversionReport> {
        let SanitizedRows { rows, warnings } = prepared;
        let mut report = match sink {
            SinkDescriptor::Connection(uri) => {
                if rows.is_empty() {
                    tracing::info!("no documents to insert");
                    ConversionReport::new(OutputFormat::MongoDb)
                } else {
                    let store = self.open_store(uri).await?;
                    self.bulk_insert(store.as_ref(), &rows).await?
                }
            }
            SinkDescriptor::File(path) => {
                // preprocess already reported per-row progress
                let quiet = ProgressReporter::new(OutputFormat::MongoDb);
                let documents = rows_to_documents(&rows, &quiet, to_document_store_value);
                self.reporter.report(
                    ConvertPhase::Writing,
                    ProgressLevel::Info,
                    0,
                    documents.len() as u64,
                    format!("Writing {} documents to {}", documents.len(), path.display()),
                );
                write_document_array(path, &documents)?;

                let mut report = ConversionReport::new(OutputFormat::MongoDb);
                report.rows = documents.len() as u64;
                report.artifact = Some(path.clone());
                report
            }
        };
        report.warnings = warnings;
        Ok(report)
    }
}
