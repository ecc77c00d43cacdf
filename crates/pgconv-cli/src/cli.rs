//! `pgconv` - export PostgreSQL data as JSON, CSV, SQL or into MongoDB

mod logging;

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use pgconv_convert::{
    ConvertProgress, OutputFormat, ProgressCallback, ProgressLevel, SinkDescriptor, converter_for,
};
use pgconv_core::{ConverterConfig, Dataset, JsonFileSource, RowSource};
use pgconv_driver_postgres::PostgresRowSource;

const DEFAULT_CONFIG_PATH: &str = "config/default_config.toml";

#[derive(Debug, Parser)]
#[command(name = "pgconv", version, about = "Convert PostgreSQL data to JSON, CSV, SQL or MongoDB")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Output format: json, csv, sql or mongodb
    #[arg(short, long, value_parser = parse_format)]
    format: Option<OutputFormat>,

    /// SQL query to extract
    #[arg(short, long, conflicts_with = "table")]
    query: Option<String>,

    /// Table to extract
    #[arg(short, long)]
    table: Option<String>,

    /// Read rows from a JSON array file instead of PostgreSQL
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Maximum number of rows to extract
    #[arg(short, long)]
    limit: Option<usize>,

    /// Output file, or a connection URI such as mongodb://host/db
    #[arg(short, long)]
    output: Option<String>,

    /// SQL dialect for the sql format
    #[arg(long)]
    dialect: Option<String>,

    /// Target table name for the sql format
    #[arg(long)]
    table_name: Option<String>,

    /// List the available tables and exit
    #[arg(long)]
    list_tables: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// PostgreSQL password
    #[arg(long, env = "PGCONV_PG_PASSWORD", hide_env_values = true)]
    pg_password: Option<String>,
}

fn parse_format(value: &str) -> Result<OutputFormat, String> {
    value.parse().map_err(|e: pgconv_core::ConvertError| e.to_string())
}

/// What to pull out of the source
#[derive(Debug, Clone, PartialEq, Eq)]
enum Selection {
    Query(String),
    Table(String),
    /// Everything the source holds; only meaningful for file input
    All,
}

impl Selection {
    fn from_cli(cli: &Cli) -> Self {
        match (&cli.query, &cli.table) {
            (Some(query), _) => Selection::Query(query.clone()),
            (None, Some(table)) => Selection::Table(table.clone()),
            (None, None) => Selection::All,
        }
    }
}

enum Source {
    Postgres(PostgresRowSource),
    File(JsonFileSource),
}

impl Source {
    async fn open(cli: &Cli, config: &ConverterConfig) -> Result<Self> {
        match &cli.input {
            Some(path) => Ok(Source::File(JsonFileSource::new(path))),
            None => {
                let source = PostgresRowSource::connect(&config.postgresql).await?;
                Ok(Source::Postgres(source))
            }
        }
    }

    fn row_source(&self) -> &dyn RowSource {
        match self {
            Source::Postgres(source) => source,
            Source::File(source) => source,
        }
    }

    async fn extract(&self, selection: &Selection, limit: Option<usize>) -> Result<Dataset> {
        let mut dataset = match (self, selection) {
            (Source::Postgres(source), Selection::Table(table)) => {
                return Ok(source.fetch_table_limited(table, limit).await?);
            }
            (Source::Postgres(_), Selection::All) => {
                bail!("either --query or --table is required when reading from PostgreSQL")
            }
            (source, Selection::Query(query)) => source.row_source().fetch_all(query).await?,
            (source, Selection::Table(table)) => source.row_source().fetch_table(table).await?,
            (Source::File(source), Selection::All) => source.fetch_all("").await?,
        };
        if let Some(limit) = limit {
            dataset.truncate(limit);
        }
        Ok(dataset)
    }
}

/// Load the configuration file, using defaults when the default path is absent
fn load_config(path: &Path) -> Result<ConverterConfig> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        return Ok(ConverterConfig::default());
    }
    Ok(ConverterConfig::load(path)?)
}

fn apply_overrides(config: &mut ConverterConfig, cli: &Cli) {
    if let Some(dialect) = &cli.dialect {
        config.sql.dialect = dialect.clone();
    }
    if let Some(table_name) = &cli.table_name {
        config.sql.table_name = Some(table_name.clone());
    }
    if let Some(password) = &cli.pg_password {
        config.postgresql.password = Some(password.clone());
    }
}

fn resolve_format(cli: &Cli, config: &ConverterConfig) -> Result<OutputFormat> {
    match cli.format {
        Some(format) => Ok(format),
        None => Ok(config.output.default_format.parse()?),
    }
}

fn resolve_sink(cli: &Cli, config: &ConverterConfig, format: OutputFormat) -> SinkDescriptor {
    match &cli.output {
        Some(output) => SinkDescriptor::parse(output),
        None => SinkDescriptor::file(
            config
                .output
                .output_dir
                .join(format!("output.{}", format.extension())),
        ),
    }
}

fn progress_logger() -> ProgressCallback {
    Arc::new(|progress: ConvertProgress| match progress.level {
        ProgressLevel::Error => tracing::error!(
            format = %progress.format,
            phase = ?progress.phase,
            "{}",
            progress.message
        ),
        ProgressLevel::Warning => tracing::warn!(
            format = %progress.format,
            phase = ?progress.phase,
            "{}",
            progress.message
        ),
        ProgressLevel::Info | ProgressLevel::Success => tracing::info!(
            format = %progress.format,
            phase = ?progress.phase,
            rows = progress.rows_processed,
            total = progress.total_rows,
            "{}",
            progress.message
        ),
    })
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let _guard = logging::init(&logging::LoggingConfig::from_options(&config.logging, cli.verbose))?;
    tracing::debug!(config = ?config, "configuration loaded");

    let source = Source::open(&cli, &config)
        .await
        .context("extraction failed")?;
    tracing::info!(source = source.row_source().name(), "source opened");

    if cli.list_tables {
        let tables = source
            .row_source()
            .list_tables()
            .await
            .context("extraction failed")?;
        for table in tables {
            println!("{}", table);
        }
        return Ok(());
    }

    let format = resolve_format(&cli, &config)?;
    let sink = resolve_sink(&cli, &config, format);

    let selection = Selection::from_cli(&cli);
    let dataset = source
        .extract(&selection, cli.limit)
        .await
        .context("extraction failed")?;
    tracing::info!(rows = dataset.len(), "extracted rows");

    let converter = converter_for(format, &config, Some(progress_logger()))?;
    let report = converter
        .try_convert(&dataset, &sink)
        .await
        .context("conversion failed")?;

    println!(
        "Converted {} rows to {} -> {}",
        report.rows,
        report.format,
        report
            .artifact
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| sink.to_string())
    );
    if !report.warnings.is_empty() {
        println!("{} warning(s); see the log for details", report.warnings.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("pgconv failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pgconv").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case("json", OutputFormat::Json)]
    #[case("CSV", OutputFormat::Csv)]
    #[case("mongo", OutputFormat::MongoDb)]
    #[case("sql", OutputFormat::Sql)]
    fn test_format_flag(#[case] flag: &str, #[case] expected: OutputFormat) {
        assert_eq!(parse(&["--format", flag]).format, Some(expected));
    }

    #[test]
    fn test_rejects_unknown_format_and_conflicting_selection() {
        assert!(Cli::try_parse_from(["pgconv", "--format", "xml"]).is_err());
        assert!(Cli::try_parse_from(["pgconv", "--query", "SELECT 1", "--table", "t"]).is_err());
    }

    #[test]
    fn test_selection() {
        assert_eq!(
            Selection::from_cli(&parse(&["--table", "users"])),
            Selection::Table("users".to_string())
        );
        assert_eq!(
            Selection::from_cli(&parse(&["--query", "SELECT 1"])),
            Selection::Query("SELECT 1".to_string())
        );
        assert_eq!(Selection::from_cli(&parse(&[])), Selection::All);
    }

    #[test]
    fn test_default_output_path() {
        let cli = parse(&[]);
        let config = ConverterConfig::default();
        let sink = resolve_sink(&cli, &config, OutputFormat::MongoDb);
        assert_eq!(sink.as_path(), Some(Path::new("./output/output.json")));

        let cli = parse(&["--output", "mongodb://db.internal/exports"]);
        assert!(resolve_sink(&cli, &config, OutputFormat::MongoDb).as_path().is_none());
    }

    #[test]
    fn test_format_falls_back_to_config() {
        let mut config = ConverterConfig::default();
        config.output.default_format = "csv".to_string();
        assert_eq!(resolve_format(&parse(&[]), &config).unwrap(), OutputFormat::Csv);
        assert_eq!(
            resolve_format(&parse(&["-f", "sql"]), &config).unwrap(),
            OutputFormat::Sql
        );

        config.output.default_format = "parquet".to_string();
        assert!(resolve_format(&parse(&[]), &config).is_err());
    }

    #[test]
    fn test_missing_custom_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config(&missing).is_err());
    }

    #[test]
    fn test_config_file_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pgconv.toml");
        std::fs::write(&path, "[sql]\ndialect = \"sqlite\"\nbatch_size = 5\n").unwrap();

        let mut config = load_config(&path).unwrap();
        assert_eq!(config.sql.batch_size, 5);

        let cli = parse(&["--dialect", "postgresql", "--table-name", "people", "--pg-password", "pw"]);
        apply_overrides(&mut config, &cli);
        assert_eq!(config.sql.dialect, "postgresql");
        assert_eq!(config.sql.table_name.as_deref(), Some("people"));
        assert_eq!(config.postgresql.password.as_deref(), Some("pw"));
    }

    #[tokio::test]
    async fn test_file_source_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.json");
        std::fs::write(&path, r#"[{"id": 1}, {"id": 2}, {"id": 3}]"#).unwrap();

        let source = Source::File(JsonFileSource::new(&path));
        assert_eq!(source.extract(&Selection::All, None).await.unwrap().len(), 3);
        assert_eq!(source.extract(&Selection::All, Some(2)).await.unwrap().len(), 2);
        assert_eq!(
            source
                .extract(&Selection::Table("people".to_string()), None)
                .await
                .unwrap()
                .len(),
            3
        );
        assert!(
            source
                .extract(&Selection::Table("other".to_string()), None)
                .await
                .is_err()
        );
    }
}
