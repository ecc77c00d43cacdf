//! pgconv Core - shared abstractions for the format converters
//!
//! This crate provides the types that every other pgconv crate depends on:
//!
//! - `Value` / `ValueKind` - the dynamically-typed cell value extracted from a source
//! - `Row` / `Dataset` - ordered column-name → value records
//! - `SqlDialect` - target SQL dialect conventions
//! - `ConverterConfig` - the configuration surface consumed by the converters
//! - `RowSource` - the extraction collaborator that supplies datasets
//! - `ConvertError` / `ExtractionError` - error types for the two halves of a run

mod config;
mod dialect;
mod error;
mod source;
mod types;

pub use config::*;
pub use dialect::*;
pub use error::*;
pub use source::*;
pub use types::*;
