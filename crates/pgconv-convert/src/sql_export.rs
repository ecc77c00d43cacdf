//! SQL script output
//!
//! Produces a `CREATE TABLE` whose column types are inferred from the first
//! row, followed by `INSERT` statements. Columns the `CREATE TABLE` does not
//! declare are dropped from every row. In batch mode each statement carries
//! up to `batch_size` rows and uses the column list of its batch's first row;
//! other rows are fitted to that list (missing columns become `NULL`). In
//! single-row mode each statement uses its own row's declared columns.

use async_trait::async_trait;
use indexmap::IndexMap;

use pgconv_core::{ConvertError, Result, Row, SqlDialect, SqlOptions};

use crate::converter::{
    ConversionReport, ConvertPhase, ConvertWarning, FormatPipeline, OutputFormat,
    ProgressCallback, ProgressLevel, ProgressReporter, WarningKind, key_drift_warnings,
    rename_columns,
};
use crate::normalize::{is_invalid_decimal, is_non_finite, to_sql_literal};
use crate::sink::{SinkDescriptor, write_atomically};
use crate::type_inference::{ColumnDeclaration, declare_columns};

/// Characters replaced by `_` in column names
const UNSAFE_COLUMN_CHARS: &[char] = &[
    ' ', '(', ')', '.', ',', ';', ':', '!', '?', '%', '$', '#', '@', '*', '+', '/', '\\',
];

/// Make a column name usable as an unquoted-style SQL identifier
///
/// Punctuation and spaces become `_`; a leading digit gets a `c_` prefix.
/// Idempotent.
pub fn sanitize_column_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if UNSAFE_COLUMN_CHARS.contains(&c) { '_' } else { c })
        .collect();
    if replaced.starts_with(|c: char| c.is_ascii_digit()) {
        format!("c_{}", replaced)
    } else {
        replaced
    }
}

/// Rows as SQL literals, keyed by sanitized column name
#[derive(Debug, Clone, Default)]
pub struct SqlRows {
    /// Table columns, inferred from the first row
    pub columns: Vec<ColumnDeclaration>,
    pub rows: Vec<IndexMap<String, String>>,
    pub warnings: Vec<ConvertWarning>,
}

/// Writes the dataset as a `CREATE TABLE` plus `INSERT` script
pub struct SqlConverter {
    dialect: SqlDialect,
    table_name: Option<String>,
    batch_size: usize,
    use_batch_insert: bool,
    reporter: ProgressReporter,
}

impl SqlConverter {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            table_name: None,
            batch_size: 100,
            use_batch_insert: true,
            reporter: ProgressReporter::new(OutputFormat::Sql),
        }
    }

    pub fn from_options(options: &SqlOptions) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(ConvertError::Configuration(
                "sql.batch_size must be at least 1".to_string(),
            ));
        }
        let mut converter = Self::new(options.sql_dialect())
            .with_batch_insert(options.use_batch_insert, options.batch_size);
        converter.table_name = options.table_name.clone().filter(|t| !t.is_empty());
        Ok(converter)
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Toggle multi-row `INSERT`s and set their row count (at least 1)
    pub fn with_batch_insert(mut self, enabled: bool, batch_size: usize) -> Self {
        self.use_batch_insert = enabled;
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set progress callback
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.reporter.set_callback(callback);
        self
    }

    /// The configured table name, else the sink's file stem
    fn resolve_table_name(&self, sink: &SinkDescriptor) -> Result<String> {
        if let Some(name) = &self.table_name {
            return Ok(name.clone());
        }
        sink.as_path()
            .and_then(|path| path.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| {
                ConvertError::Validation(format!("cannot derive a table name from {}", sink))
            })
    }

    fn literal_warnings(&self, row_index: usize, row: &Row) -> Vec<ConvertWarning> {
        row.iter()
            .filter_map(|(column, value)| {
                let (kind, message) = if is_non_finite(value) {
                    (
                        WarningKind::NonFiniteFloat,
                        format!("Row {}: {} is {} and is written as NULL", row_index, column, value),
                    )
                } else if is_invalid_decimal(value) {
                    (
                        WarningKind::InvalidDecimal,
                        format!(
                            "Row {}: {} is not a numeric literal and is written as a string",
                            row_index, column
                        ),
                    )
                } else {
                    return None;
                };
                Some(ConvertWarning {
                    row: Some(row_index),
                    column: Some(column.to_string()),
                    kind,
                    message,
                })
            })
            .collect()
    }

    /// Render the whole script; returns the text and the number of `INSERT`s
    pub fn render_script(&self, table: &str, prepared: &SqlRows) -> (String, usize) {
        if prepared.rows.is_empty() {
            return (format!("-- No data to convert for table {}\n", table), 0);
        }

        let quoted_table = self.dialect.quote_identifier(table);
        let mut script = self.create_table_statement(&quoted_table, &prepared.columns);
        script.push_str("\n\n-- Data insertion statements\n");

        let total = prepared.rows.len() as u64;
        let mut written = 0u64;
        let mut statements = 0;

        if self.use_batch_insert {
            let batch_count = prepared.rows.len().div_ceil(self.batch_size);
            for (index, batch) in prepared.rows.chunks(self.batch_size).enumerate() {
                script.push_str(&self.batch_insert_statement(&quoted_table, batch));
                script.push('\n');
                statements += 1;
                written += batch.len() as u64;
                self.reporter.report(
                    ConvertPhase::Writing,
                    ProgressLevel::Info,
                    written,
                    total,
                    format!("Generated INSERT batch {}/{}", index + 1, batch_count),
                );
            }
        } else {
            for row in &prepared.rows {
                script.push_str(&self.single_insert_statement(&quoted_table, row));
                script.push('\n');
                statements += 1;
            }
            self.reporter.report(
                ConvertPhase::Writing,
                ProgressLevel::Info,
                total,
                total,
                format!("Generated {} INSERT statements", statements),
            );
        }

        (script, statements)
    }

    fn create_table_statement(&self, quoted_table: &str, columns: &[ColumnDeclaration]) -> String {
        let body: Vec<String> = columns
            .iter()
            .map(|column| format!("    {}", column.render(self.dialect)))
            .collect();
        format!("CREATE TABLE {} (\n{}\n);\n", quoted_table, body.join(",\n"))
    }

    fn column_list<'a>(&self, columns: impl Iterator<Item = &'a String>) -> String {
        columns
            .map(|c| self.dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn batch_insert_statement(&self, quoted_table: &str, batch: &[IndexMap<String, String>]) -> String {
        let Some(first) = batch.first() else {
            return String::new();
        };
        let tuples: Vec<String> = batch
            .iter()
            .map(|row| {
                let values: Vec<&str> = first
                    .keys()
                    .map(|column| row.get(column).map(String::as_str).unwrap_or("NULL"))
                    .collect();
                format!("({})", values.join(", "))
            })
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES\n{};",
            quoted_table,
            self.column_list(first.keys()),
            tuples.join(",\n")
        )
    }

    fn single_insert_statement(&self, quoted_table: &str, row: &IndexMap<String, String>) -> String {
        let values: Vec<&str> = row.values().map(String::as_str).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({});",
            quoted_table,
            self.column_list(row.keys()),
            values.join(", ")
        )
    }
}

impl Default for SqlConverter {
    fn default() -> Self {
        Self::new(SqlDialect::default())
    }
}

#[async_trait]
impl FormatPipeline for SqlConverter {
    type Prepared = SqlRows;

    fn output_format(&self) -> OutputFormat {
        OutputFormat::Sql
    }

    fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    fn validate(&self, dataset: &[Row]) -> Result<Vec<ConvertWarning>> {
        if dataset.first().is_some_and(Row::is_empty) {
            return Err(ConvertError::Validation(
                "the first row has no columns to declare".to_string(),
            ));
        }
        Ok(key_drift_warnings(dataset))
    }

    fn preprocess(&self, dataset: &[Row]) -> Result<Self::Prepared> {
        let sanitized = rename_columns(dataset, &self.reporter, sanitize_column_name);
        let mut warnings = sanitized.warnings;

        let columns = sanitized
            .rows
            .first()
            .map(|first| declare_columns(first, self.dialect))
            .unwrap_or_default();

        let rows: Vec<IndexMap<String, String>> = sanitized
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                for warning in self.literal_warnings(index, row) {
                    self.reporter.warning(ConvertPhase::Preprocessing, &warning);
                    warnings.push(warning);
                }
                row.iter()
                    .filter(|(column, _)| columns.iter().any(|declared| declared.name == *column))
                    .map(|(column, value)| (column.to_string(), to_sql_literal(value, self.dialect)))
                    .collect()
            })
            .collect();

        Ok(SqlRows {
            columns,
            rows,
            warnings,
        })
    }

    async fn render(&self, prepared: Self::Prepared, sink: &SinkDescriptor) -> Result<ConversionReport> {
        let path = sink.require_file(OutputFormat::Sql.name())?;
        let table = self.resolve_table_name(sink)?;

        let (script, statements) = self.render_script(&table, &prepared);
        write_atomically(path, |writer| {
            writer.write_all(script.as_bytes())?;
            Ok(())
        })?;
        tracing::info!(
            table = %table,
            dialect = %self.dialect,
            statements,
            path = %path.display(),
            "SQL script written"
        );

        let mut report = ConversionReport::new(OutputFormat::Sql);
        report.rows = prepared.rows.len() as u64;
        report.batches = statements;
        report.artifact = Some(path.to_path_buf());
        report.warnings = prepared.warnings;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::Converter;
    use chrono::NaiveDate;
    use pgconv_core::Value;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    async fn script_for(converter: &SqlConverter, dataset: &[Row]) -> (String, ConversionReport) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.sql");
        let report = converter
            .try_convert(dataset, &SinkDescriptor::file(&path))
            .await
            .unwrap();
        (std::fs::read_to_string(&path).unwrap(), report)
    }

    #[rstest]
    #[case("first name", "first_name")]
    #[case("total($)", "total___")]
    #[case("a.b,c;d", "a_b_c_d")]
    #[case("2024total", "c_2024total")]
    #[case("path/to\\x", "path_to_x")]
    #[case("plain", "plain")]
    fn test_sanitize_column_name(#[case] name: &str, #[case] expected: &str) {
        let once = sanitize_column_name(name);
        assert_eq!(once, expected);
        assert_eq!(sanitize_column_name(&once), once);
    }

    #[tokio::test]
    async fn test_full_script_layout() {
        let dataset = vec![
            Row::new().with("id", 1).with("name", "Alice"),
            Row::new().with("id", 2).with("name", "Bob"),
        ];
        let (script, report) = script_for(&SqlConverter::new(SqlDialect::MySql), &dataset).await;
        assert_eq!(
            script,
            "CREATE TABLE `people` (\n    `id` INT,\n    `name` VARCHAR(10)\n);\n\
             \n\n-- Data insertion statements\n\
             INSERT INTO `people` (`id`, `name`) VALUES\n(1, 'Alice'),\n(2, 'Bob');\n"
        );
        assert_eq!(report.rows, 2);
        assert_eq!(report.batches, 1);
    }

    #[tokio::test]
    async fn test_decimal_is_unquoted() {
        let dataset = vec![Row::new()
            .with("id", 1)
            .with("amount", Value::Decimal("9.99".into()))];
        let (script, _) = script_for(&SqlConverter::new(SqlDialect::MySql), &dataset).await;
        assert!(script.contains("`amount` DECIMAL(18, 6)"), "{script}");
        assert!(script.contains("(1, 9.99)"), "{script}");
    }

    #[tokio::test]
    async fn test_single_quotes_are_doubled() {
        let dataset = vec![Row::new().with("name", "O'Brien")];
        let (script, _) = script_for(&SqlConverter::new(SqlDialect::PostgreSql), &dataset).await;
        assert!(script.contains("('O''Brien')"), "{script}");
        assert!(script.contains("CREATE TABLE \"people\""), "{script}");
    }

    #[tokio::test]
    async fn test_batches_follow_batch_size() {
        let dataset: Vec<Row> = (0..5).map(|i| Row::new().with("id", i)).collect();
        let converter = SqlConverter::new(SqlDialect::Generic).with_batch_insert(true, 2);
        let (script, report) = script_for(&converter, &dataset).await;
        assert_eq!(report.batches, 3);
        assert_eq!(script.matches("INSERT INTO").count(), 3);
        assert!(script.contains("VALUES\n(4);\n"), "{script}");
    }

    #[tokio::test]
    async fn test_single_row_inserts_use_own_columns() {
        let dataset = vec![
            Row::new().with("id", 1).with("name", "A"),
            Row::new().with("name", "B").with("id", 2),
        ];
        let converter = SqlConverter::new(SqlDialect::MySql).with_batch_insert(false, 100);
        let (script, report) = script_for(&converter, &dataset).await;
        assert!(script.contains("INSERT INTO `people` (`id`, `name`) VALUES (1, 'A');\n"));
        assert!(script.contains("INSERT INTO `people` (`name`, `id`) VALUES ('B', 2);\n"));
        assert_eq!(report.batches, 2);
    }

    #[tokio::test]
    async fn test_batch_rows_fitted_to_first_row() {
        let dataset = vec![
            Row::new().with("id", 1).with("name", "A"),
            Row::new().with("id", 2).with("email", "b@example.com"),
        ];
        let (script, report) = script_for(&SqlConverter::new(SqlDialect::MySql), &dataset).await;
        assert!(script.contains("(1, 'A'),\n(2, NULL);"), "{script}");
        assert!(!script.contains("example.com"));
        assert!(report.warnings.iter().any(|w| w.kind == WarningKind::InconsistentKeys));
    }

    #[tokio::test]
    async fn test_undeclared_columns_never_reach_inserts() {
        let dataset = vec![
            Row::new().with("id", 1),
            Row::new().with("id", 2).with("email", "x@y"),
        ];
        for converter in [
            SqlConverter::new(SqlDialect::MySql).with_batch_insert(false, 100),
            SqlConverter::new(SqlDialect::MySql).with_batch_insert(true, 1),
        ] {
            let (script, report) = script_for(&converter, &dataset).await;
            assert!(!script.contains("`email`"), "{script}");
            assert!(!script.contains("x@y"), "{script}");
            assert!(script.contains("INSERT INTO `people` (`id`) VALUES"), "{script}");
            assert!(script.contains("(2);"), "{script}");
            assert_eq!(report.batches, 2);
        }
    }

    #[tokio::test]
    async fn test_single_row_insert_keeps_order_of_declared_columns() {
        let dataset = vec![
            Row::new().with("id", 1).with("name", "A"),
            Row::new().with("extra", true).with("name", "B").with("id", 2),
        ];
        let converter = SqlConverter::new(SqlDialect::MySql).with_batch_insert(false, 100);
        let (script, _) = script_for(&converter, &dataset).await;
        assert!(script.contains("INSERT INTO `people` (`name`, `id`) VALUES ('B', 2);\n"), "{script}");
    }

    #[tokio::test]
    async fn test_sanitized_columns_in_ddl_and_dml() {
        let dataset = vec![Row::new().with("first name", "A").with("2024total", 3)];
        let (script, _) = script_for(&SqlConverter::new(SqlDialect::MySql), &dataset).await;
        assert!(script.contains("`first_name` VARCHAR(2)"), "{script}");
        assert!(script.contains("`c_2024total` INT"), "{script}");
        assert!(script.contains("(`first_name`, `c_2024total`)"), "{script}");
    }

    #[tokio::test]
    async fn test_empty_dataset_writes_comment() {
        let (script, report) = script_for(&SqlConverter::default(), &[]).await;
        assert_eq!(script, "-- No data to convert for table people\n");
        assert_eq!(report.rows, 0);
    }

    #[tokio::test]
    async fn test_configured_table_name_wins() {
        let dataset = vec![Row::new().with("id", 1)];
        let converter = SqlConverter::new(SqlDialect::MySql).with_table_name("accounts");
        let (script, _) = script_for(&converter, &dataset).await;
        assert!(script.starts_with("CREATE TABLE `accounts` ("), "{script}");
    }

    #[tokio::test]
    async fn test_dialect_specific_literals() {
        let day = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        let dataset = vec![Row::new()
            .with("ok", true)
            .with("blob", vec![0xff_u8])
            .with("day", day)
            .with("meta", Value::Json(serde_json::json!({"k": "it's"})))];

        let (mysql, _) = script_for(&SqlConverter::new(SqlDialect::MySql), &dataset).await;
        assert!(mysql.contains(r#"(1, X'ff', '2023-01-15', '{"k":"it''s"}')"#), "{mysql}");
        assert!(mysql.contains("`meta` JSON"), "{mysql}");
        assert!(mysql.contains("`day` DATE"), "{mysql}");

        let (pg, _) = script_for(&SqlConverter::new(SqlDialect::PostgreSql), &dataset).await;
        assert!(pg.contains(r#"(TRUE, '\xff', '2023-01-15', '{"k":"it''s"}')"#), "{pg}");
        assert!(pg.contains("\"meta\" JSONB"), "{pg}");
    }

    #[tokio::test]
    async fn test_non_finite_float_warns() {
        let dataset = vec![Row::new().with("ratio", f64::NAN)];
        let (script, report) = script_for(&SqlConverter::default(), &dataset).await;
        assert!(script.contains("VALUES\n(NULL);"), "{script}");
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, WarningKind::NonFiniteFloat);
    }

    #[tokio::test]
    async fn test_rejects_row_without_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.sql");
        let err = SqlConverter::default()
            .try_convert(&[Row::new()], &SinkDescriptor::file(&path))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Validation(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_connection_sink_is_unsupported() {
        let dataset = vec![Row::new().with("id", 1)];
        let err = SqlConverter::default()
            .try_convert(&dataset, &SinkDescriptor::parse("postgres://localhost/db"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedSink(_)));
    }
}
