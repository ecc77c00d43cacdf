//! Format converters for pgconv
//!
//! Turns an in-memory dataset of PostgreSQL rows into one of four targets
//! while keeping the semantics of every typed value:
//!
//! - JSON: an indented array of objects
//! - MongoDB: a bulk insert into a collection, or an extended-JSON file
//! - CSV: delimited text with a header row
//! - SQL: a `CREATE TABLE` plus `INSERT` script for a chosen dialect
//!
//! # Example
//!
//! ```ignore
//! use pgconv_convert::{OutputFormat, SinkDescriptor, converter_for};
//! use pgconv_core::ConverterConfig;
//!
//! let config = ConverterConfig::default();
//! let converter = converter_for(OutputFormat::Sql, &config, None)?;
//! let ok = converter.convert(&rows, &SinkDescriptor::parse("out/users.sql")).await;
//! ```

mod converter;
#[cfg(test)]
mod converter_tests;
mod csv_export;
mod document_store;
mod json_export;
pub mod normalize;
mod sink;
mod sql_export;
pub mod type_inference;

pub use converter::*;
pub use csv_export::{CsvConverter, CsvTable};
pub use document_store::{
    DocumentStore, INSERT_BATCH_SIZE, MongoDbConverter, MongoDocumentStore, StoreError,
    insert_batches, row_to_document, sanitize_document_key, to_bson,
};
pub use json_export::{JsonConverter, rows_to_documents};
pub use normalize::{NormalizedValue, TargetFormat, normalize};
pub use sink::{SinkDescriptor, redact_uri, write_atomically};
pub use sql_export::{SqlConverter, SqlRows, sanitize_column_name};
pub use type_inference::{ColumnDeclaration, DEFAULT_SQL_TYPE, infer_sql_type};
