//! PostgreSQL row source for pgconv
//!
//! Connects with `tokio-postgres` (TLS through `native-tls` unless
//! `sslmode = "disable"`) and decodes every column into a `pgconv_core::Value`.
//! NUMERIC columns are decoded from the binary wire format into exact decimal
//! text, so no precision is lost before a converter sees them.

mod connection;
mod numeric;

pub use connection::{ColumnInfo, PostgresRowSource, TlsPolicy};
pub use numeric::{NumericText, decode_numeric};
