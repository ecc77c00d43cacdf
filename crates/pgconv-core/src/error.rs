//! Error types for pgconv

use thiserror::Error;

/// Errors raised while converting a dataset into a target format
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Bulk insert failed on batch {batch}: {message}")]
    BulkInsert { batch: usize, message: String },

    #[error("Unsupported sink: {0}")]
    UnsupportedSink(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Errors raised by a row source while extracting data
///
/// Kept apart from `ConvertError` so callers can tell an extraction failure
/// from a conversion failure.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for conversion operations
pub type Result<T> = std::result::Result<T, ConvertError>;
