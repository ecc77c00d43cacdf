//! PostgreSQL row source

use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::config::SslMode;
use tokio_postgres::types::FromSql;
use tokio_postgres::{Client, NoTls, Row as PgRow};

use pgconv_core::{
    Dataset, ExtractionError, PostgresOptions, Row, RowSource, Value, quote_table_name,
};

use crate::numeric::NumericText;

/// How the connection negotiates TLS, from the libpq-style `sslmode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsPolicy {
    Disable,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl TlsPolicy {
    /// Unknown modes are treated as `prefer`
    pub fn from_sslmode(mode: &str) -> Self {
        match mode.trim().to_lowercase().replace('_', "-").as_str() {
            "disable" => TlsPolicy::Disable,
            "require" => TlsPolicy::Require,
            "verify-ca" => TlsPolicy::VerifyCa,
            "verify-full" => TlsPolicy::VerifyFull,
            "allow" | "prefer" => TlsPolicy::Prefer,
            other => {
                tracing::warn!(sslmode = %other, "unknown sslmode, using prefer");
                TlsPolicy::Prefer
            }
        }
    }

    pub fn ssl_mode(&self) -> SslMode {
        match self {
            TlsPolicy::Disable => SslMode::Disable,
            TlsPolicy::Prefer => SslMode::Prefer,
            TlsPolicy::Require | TlsPolicy::VerifyCa | TlsPolicy::VerifyFull => SslMode::Require,
        }
    }

    /// `require` encrypts without checking the server certificate
    pub fn accept_invalid_certs(&self) -> bool {
        matches!(self, TlsPolicy::Require)
    }

    /// Only `verify-full` checks that the certificate matches the host
    pub fn accept_invalid_hostnames(&self) -> bool {
        matches!(self, TlsPolicy::Require | TlsPolicy::VerifyCa)
    }
}

/// Column metadata from `information_schema.columns`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Reads datasets from a PostgreSQL database
pub struct PostgresRowSource {
    client: Client,
    name: String,
}

impl PostgresRowSource {
    /// Connect using the `[postgresql]` options
    pub async fn connect(options: &PostgresOptions) -> Result<Self, ExtractionError> {
        let policy = TlsPolicy::from_sslmode(&options.sslmode);
        tracing::info!(
            host = %options.host,
            port = options.port,
            database = %options.database,
            sslmode = ?policy,
            "connecting to PostgreSQL database"
        );

        let mut config = tokio_postgres::Config::new();
        config
            .host(&options.host)
            .port(options.port)
            .dbname(&options.database)
            .user(&options.user)
            .ssl_mode(policy.ssl_mode());
        if let Some(password) = &options.password {
            config.password(password);
        }

        let client = if policy == TlsPolicy::Disable {
            let (client, connection) = config.connect(NoTls).await.map_err(connect_error)?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });
            client
        } else {
            let connector = TlsConnector::builder()
                .danger_accept_invalid_certs(policy.accept_invalid_certs())
                .danger_accept_invalid_hostnames(policy.accept_invalid_hostnames())
                .build()
                .map_err(|e| {
                    ExtractionError::Connection(format!("Failed to build TLS connector: {}", e))
                })?;
            let (client, connection) = config
                .connect(MakeTlsConnector::new(connector))
                .await
                .map_err(connect_error)?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });
            client
        };

        tracing::info!(host = %options.host, database = %options.database, "PostgreSQL connection established");
        Ok(Self {
            client,
            name: describe(options),
        })
    }

    /// Fetch a table, optionally capped at `limit` rows
    pub async fn fetch_table_limited(
        &self,
        table: &str,
        limit: Option<usize>,
    ) -> Result<Dataset, ExtractionError> {
        self.fetch_all(&table_query(table, limit)).await
    }

    /// Column names, types and nullability of a table, in ordinal order
    pub async fn table_schema(&self, table: &str) -> Result<Vec<ColumnInfo>, ExtractionError> {
        let (schema, name) = table.split_once('.').unwrap_or(("public", table));
        let rows = self
            .client
            .query(
                "SELECT column_name, data_type, is_nullable \
                 FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 \
                 ORDER BY ordinal_position",
                &[&schema, &name],
            )
            .await
            .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                let nullable: String = row.try_get(2).map_err(query_error)?;
                Ok(ColumnInfo {
                    name: row.try_get(0).map_err(query_error)?,
                    data_type: row.try_get(1).map_err(query_error)?,
                    nullable: nullable == "YES",
                })
            })
            .collect()
    }
}

#[async_trait]
impl RowSource for PostgresRowSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self), fields(source = %self.name))]
    async fn fetch_all(&self, query: &str) -> Result<Dataset, ExtractionError> {
        let rows = self.client.query(query, &[]).await.map_err(query_error)?;
        tracing::debug!(rows = rows.len(), "query returned");
        rows.iter().map(decode_row).collect()
    }

    async fn fetch_table(&self, table: &str) -> Result<Dataset, ExtractionError> {
        self.fetch_table_limited(table, None).await
    }

    async fn list_tables(&self) -> Result<Vec<String>, ExtractionError> {
        let rows = self
            .client
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[],
            )
            .await
            .map_err(query_error)?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(query_error))
            .collect()
    }
}

fn connect_error(e: tokio_postgres::Error) -> ExtractionError {
    ExtractionError::Connection(format!("Failed to connect to PostgreSQL: {}", e))
}

fn query_error(e: tokio_postgres::Error) -> ExtractionError {
    ExtractionError::Query(e.to_string())
}

/// `postgresql://user@host:port/database`, without the password
fn describe(options: &PostgresOptions) -> String {
    format!(
        "postgresql://{}@{}:{}/{}",
        options.user, options.host, options.port, options.database
    )
}

fn table_query(table: &str, limit: Option<usize>) -> String {
    let mut query = format!("SELECT * FROM {}", quote_table_name(table));
    if let Some(limit) = limit {
        query.push_str(&format!(" LIMIT {}", limit));
    }
    query
}

fn decode_row(row: &PgRow) -> Result<Row, ExtractionError> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| Ok((column.name().to_string(), postgres_to_value(row, idx)?)))
        .collect()
}

/// Read column `idx` as `Option<T>` and wrap it; SQL NULL becomes `Value::Null`
fn decode<'a, T, F>(row: &'a PgRow, idx: usize, wrap: F) -> Result<Value, ExtractionError>
where
    T: FromSql<'a>,
    F: FnOnce(T) -> Value,
{
    row.try_get::<_, Option<T>>(idx)
        .map(|value| value.map(wrap).unwrap_or(Value::Null))
        .map_err(|e| {
            ExtractionError::Query(format!(
                "cannot decode column {}: {}",
                row.columns()[idx].name(),
                e
            ))
        })
}

fn array_of<T: Into<Value>>(items: Vec<Option<T>>) -> Value {
    Value::Array(items.into_iter().map(Value::from).collect())
}

/// Raw payload of a type we have no decoder for; enums and domains over
/// text arrive as UTF-8
struct RawText(String);

impl<'a> FromSql<'a> for RawText {
    fn from_sql(
        _: &tokio_postgres::types::Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(Self(String::from_utf8(raw.to_vec())?))
    }

    fn accepts(_: &tokio_postgres::types::Type) -> bool {
        true
    }
}

/// Convert one PostgreSQL column to a `Value`
fn postgres_to_value(row: &PgRow, idx: usize) -> Result<Value, ExtractionError> {
    let type_name = row.columns()[idx].type_().name();

    match type_name {
        "bool" => decode(row, idx, Value::Bool),
        "int2" => decode(row, idx, |v: i16| Value::Int(v.into())),
        "int4" => decode(row, idx, |v: i32| Value::Int(v.into())),
        "int8" => decode(row, idx, Value::Int),
        "oid" => decode(row, idx, |v: u32| Value::Int(v.into())),
        "float4" => decode(row, idx, |v: f32| Value::Float(v.into())),
        "float8" => decode(row, idx, Value::Float),
        "numeric" => decode(row, idx, |v: NumericText| Value::Decimal(v.0)),
        "text" | "varchar" | "bpchar" | "name" | "citext" => decode(row, idx, Value::String),
        "uuid" => decode(row, idx, |v: uuid::Uuid| Value::String(v.to_string())),
        "time" => decode(row, idx, |v: chrono::NaiveTime| {
            Value::String(v.format("%H:%M:%S%.f").to_string())
        }),
        "bytea" => decode(row, idx, Value::Bytes),
        "json" | "jsonb" => decode(row, idx, Value::Json),
        "date" => decode(row, idx, Value::Date),
        "timestamp" => decode(row, idx, Value::DateTime),
        "timestamptz" => decode(row, idx, Value::DateTimeUtc),
        "_text" | "_varchar" | "_bpchar" | "_name" => {
            decode(row, idx, array_of::<String>)
        }
        "_int2" => decode(row, idx, |v: Vec<Option<i16>>| {
            Value::Array(
                v.into_iter()
                    .map(|item| item.map(|i| Value::Int(i.into())).unwrap_or(Value::Null))
                    .collect(),
            )
        }),
        "_int4" => decode(row, idx, array_of::<i32>),
        "_int8" => decode(row, idx, array_of::<i64>),
        "_float8" => decode(row, idx, array_of::<f64>),
        "_bool" => decode(row, idx, array_of::<bool>),
        _ => match decode(row, idx, |v: RawText| Value::String(v.0)) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(column_type = %type_name, error = %e, "unsupported column type, using NULL");
                Ok(Value::Null)
            }
        },
    }
}
