//! The converter capability interface
//!
//! Every output format implements [`FormatPipeline`] as three stages:
//! `validate` → `preprocess` → `render`. A blanket implementation turns each
//! pipeline into a [`Converter`], which runs the stages in order, reports
//! progress, and folds any failure into a logged `false`.

use async_trait::async_trait;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::Instrument;

use pgconv_core::{ConvertError, ConverterConfig, KeyDrift, Result, Row};

use crate::csv_export::CsvConverter;
use crate::document_store::MongoDbConverter;
use crate::json_export::JsonConverter;
use crate::sink::SinkDescriptor;
use crate::sql_export::SqlConverter;

/// Datasets above this size report preprocessing progress and are bulk
/// inserted in batches
pub const LARGE_DATASET_THRESHOLD: usize = 1000;

/// Output formats supported by the converters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Indented structured document (JSON)
    Json,
    /// Document store (MongoDB), either bulk-loaded or written as extended JSON
    MongoDb,
    /// Delimited tabular text
    Csv,
    /// Portable SQL script
    Sql,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Json,
        OutputFormat::MongoDb,
        OutputFormat::Csv,
        OutputFormat::Sql,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::MongoDb => "mongodb",
            OutputFormat::Csv => "csv",
            OutputFormat::Sql => "sql",
        }
    }

    /// Default file extension for file artifacts of this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json | OutputFormat::MongoDb => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Sql => "sql",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "mongodb" | "mongo" => Ok(OutputFormat::MongoDb),
            "csv" => Ok(OutputFormat::Csv),
            "sql" => Ok(OutputFormat::Sql),
            other => Err(ConvertError::Configuration(format!(
                "unsupported format: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Progress callback for conversion operations
pub type ProgressCallback = Arc<dyn Fn(ConvertProgress) + Send + Sync>;

/// Conversion progress information
#[derive(Debug, Clone)]
pub struct ConvertProgress {
    /// Format being produced
    pub format: OutputFormat,
    /// Current phase of the conversion
    pub phase: ConvertPhase,
    /// Severity of this message
    pub level: ProgressLevel,
    /// Rows handled so far in this phase
    pub rows_processed: u64,
    /// Rows in the dataset
    pub total_rows: u64,
    /// Log message
    pub message: String,
}

/// Phases of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertPhase {
    Validating,
    Preprocessing,
    /// Writing a file artifact
    Writing,
    /// Bulk-inserting into a document store
    Inserting,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// Routes progress events to the injected callback, if any
#[derive(Clone)]
pub struct ProgressReporter {
    format: OutputFormat,
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            callback: None,
        }
    }

    pub fn set_callback(&mut self, callback: ProgressCallback) {
        self.callback = Some(callback);
    }

    pub fn report(
        &self,
        phase: ConvertPhase,
        level: ProgressLevel,
        rows_processed: u64,
        total_rows: u64,
        message: impl Into<String>,
    ) {
        if let Some(ref callback) = self.callback {
            callback(ConvertProgress {
                format: self.format,
                phase,
                level,
                rows_processed,
                total_rows,
                message: message.into(),
            });
        }
    }

    /// Progress tick while preprocessing; only large datasets report
    pub fn preprocess_tick(&self, rows_processed: usize, total_rows: usize) {
        if total_rows > LARGE_DATASET_THRESHOLD
            && (rows_processed % LARGE_DATASET_THRESHOLD == 0 || rows_processed == total_rows)
        {
            self.report(
                ConvertPhase::Preprocessing,
                ProgressLevel::Info,
                rows_processed as u64,
                total_rows as u64,
                format!("Processed {}/{} rows for {}", rows_processed, total_rows, self.format),
            );
        }
    }

    /// Log a non-fatal warning and forward it to the callback
    pub fn warning(&self, phase: ConvertPhase, warning: &ConvertWarning) {
        tracing::warn!(
            format = %self.format,
            row = ?warning.row,
            column = ?warning.column,
            kind = ?warning.kind,
            "{}",
            warning.message
        );
        self.report(phase, ProgressLevel::Warning, 0, 0, warning.message.clone());
    }
}

/// Outcome of a successful conversion
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub format: OutputFormat,
    /// Rows written to the artifact or inserted into the store
    pub rows: u64,
    /// INSERT statements (SQL) or insert calls (document store) issued
    pub batches: usize,
    /// File written, when the sink was a path
    pub artifact: Option<PathBuf>,
    /// Non-fatal issues met along the way
    pub warnings: Vec<ConvertWarning>,
}

impl ConversionReport {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            rows: 0,
            batches: 0,
            artifact: None,
            warnings: Vec::new(),
        }
    }
}

/// Warning during conversion (non-fatal issues)
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertWarning {
    /// Row index (if applicable)
    pub row: Option<usize>,
    /// Column name (if applicable)
    pub column: Option<String>,
    /// Type of warning
    pub kind: WarningKind,
    /// Warning message
    pub message: String,
}

/// Types of conversion warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// A row's key set differs from the first row's
    InconsistentKeys,
    /// Two keys of one row sanitize to the same name; the later value wins
    KeyCollision,
    /// NaN or infinity has no SQL literal and is written as NULL
    NonFiniteFloat,
    /// A decimal payload is not a numeric literal and is written as a string
    InvalidDecimal,
}

impl ConvertWarning {
    pub fn inconsistent_keys(row: usize, drift: &KeyDrift) -> Self {
        Self {
            row: Some(row),
            column: None,
            kind: WarningKind::InconsistentKeys,
            message: format!(
                "Row {} has different keys than the first row (missing: [{}], extra: [{}])",
                row,
                drift.missing.join(", "),
                drift.extra.join(", ")
            ),
        }
    }

    pub fn key_collision(row: usize, original: &str, sanitized: &str) -> Self {
        Self {
            row: Some(row),
            column: Some(original.to_string()),
            kind: WarningKind::KeyCollision,
            message: format!(
                "Row {}: key {:?} sanitizes to {:?}, which is already present",
                row, original, sanitized
            ),
        }
    }
}

/// Report every row whose key set differs from the first row's
pub fn key_drift_warnings(dataset: &[Row]) -> Vec<ConvertWarning> {
    let Some(first) = dataset.first() else {
        return Vec::new();
    };
    dataset
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(index, row)| {
            KeyDrift::between(first, row).map(|drift| ConvertWarning::inconsistent_keys(index, &drift))
        })
        .collect()
}

/// Rows with sanitized keys plus the collisions met while renaming
pub struct SanitizedRows {
    pub rows: Vec<Row>,
    pub warnings: Vec<ConvertWarning>,
}

/// Rename every row's keys with `sanitize`, recording collisions
///
/// When two keys of a row sanitize to the same name the later value wins.
pub fn rename_columns<F>(
    dataset: &[Row],
    reporter: &ProgressReporter,
    sanitize: F,
) -> SanitizedRows
where
    F: Fn(&str) -> String,
{
    let total = dataset.len();
    let mut warnings = Vec::new();
    let rows = dataset
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let mut renamed = Row::new();
            for (column, value) in row.iter() {
                let name = sanitize(column);
                if renamed.contains_column(&name) {
                    let warning = ConvertWarning::key_collision(index, column, &name);
                    reporter.warning(ConvertPhase::Preprocessing, &warning);
                    warnings.push(warning);
                }
                renamed.insert(name, value.clone());
            }
            reporter.preprocess_tick(index + 1, total);
            renamed
        })
        .collect();
    SanitizedRows { rows, warnings }
}

/// One output format, expressed as validate → preprocess → render
#[async_trait]
pub trait FormatPipeline: Send + Sync {
    /// The format-specific, fully normalized form of a dataset
    type Prepared: Send;

    fn output_format(&self) -> OutputFormat;

    fn reporter(&self) -> &ProgressReporter;

    /// Check the dataset before any I/O; returns non-fatal warnings
    fn validate(&self, _dataset: &[Row]) -> Result<Vec<ConvertWarning>> {
        Ok(Vec::new())
    }

    /// Normalize every value for this format; never mutates the input
    fn preprocess(&self, dataset: &[Row]) -> Result<Self::Prepared>;

    /// Encode the prepared dataset into the sink
    async fn render(
        &self,
        prepared: Self::Prepared,
        sink: &SinkDescriptor,
    ) -> Result<ConversionReport>;
}

/// Trait for converting a dataset into one target format
#[async_trait]
pub trait Converter: Send + Sync {
    fn format(&self) -> OutputFormat;

    /// Convert and return the report, or the error that aborted the conversion
    async fn try_convert(&self, dataset: &[Row], sink: &SinkDescriptor)
    -> Result<ConversionReport>;

    /// Convert, logging any failure; `true` only when the sink was fully written
    async fn convert(&self, dataset: &[Row], sink: &SinkDescriptor) -> bool {
        match self.try_convert(dataset, sink).await {
            Ok(report) => {
                tracing::info!(
                    format = %report.format,
                    rows = report.rows,
                    batches = report.batches,
                    warnings = report.warnings.len(),
                    sink = %sink,
                    "conversion succeeded"
                );
                true
            }
            Err(e) => {
                tracing::error!(error = %e, format = %self.format(), sink = %sink, "conversion failed");
                false
            }
        }
    }
}

#[async_trait]
impl<P> Converter for P
where
    P: FormatPipeline,
{
    fn format(&self) -> OutputFormat {
        self.output_format()
    }

    async fn try_convert(
        &self,
        dataset: &[Row],
        sink: &SinkDescriptor,
    ) -> Result<ConversionReport> {
        let format = self.output_format();
        let total = dataset.len() as u64;
        let span = tracing::info_span!("convert", format = %format, rows = total);

        async move {
            let reporter = self.reporter();
            let outcome = async {
                reporter.report(
                    ConvertPhase::Validating,
                    ProgressLevel::Info,
                    0,
                    total,
                    format!("Validating {} rows", total),
                );
                let mut warnings = self.validate(dataset)?;
                for warning in &warnings {
                    reporter.warning(ConvertPhase::Validating, warning);
                }

                tracing::debug!("preprocessing data for {} conversion", format);
                let prepared = self.preprocess(dataset)?;
                let mut report = self.render(prepared, sink).await?;
                warnings.append(&mut report.warnings);
                report.warnings = warnings;
                Ok::<_, ConvertError>(report)
            }
            .await;

            match &outcome {
                Ok(report) => reporter.report(
                    ConvertPhase::Complete,
                    ProgressLevel::Success,
                    report.rows,
                    total,
                    format!("Converted {} rows to {}", report.rows, format),
                ),
                Err(e) => reporter.report(
                    ConvertPhase::Failed,
                    ProgressLevel::Error,
                    0,
                    total,
                    e.to_string(),
                ),
            }
            outcome
        }
        .instrument(span)
        .await
    }
}

/// Build the converter for `format` from the configuration
pub fn converter_for(
    format: OutputFormat,
    config: &ConverterConfig,
    progress: Option<ProgressCallback>,
) -> Result<Box<dyn Converter>> {
    config.validate()?;
    let converter: Box<dyn Converter> = match format {
        OutputFormat::Json => {
            let mut c = JsonConverter::new();
            if let Some(cb) = progress {
                c = c.with_progress_callback(cb);
            }
            Box::new(c)
        }
        OutputFormat::Csv => {
            let mut c = CsvConverter::from_options(&config.csv)?;
            if let Some(cb) = progress {
                c = c.with_progress_callback(cb);
            }
            Box::new(c)
        }
        OutputFormat::MongoDb => {
            let mut c = MongoDbConverter::new(config.mongodb.clone());
            if let Some(cb) = progress {
                c = c.with_progress_callback(cb);
            }
            Box::new(c)
        }
        OutputFormat::Sql => {
            let mut c = SqlConverter::from_options(&config.sql)?;
            if let Some(cb) = progress {
                c = c.with_progress_callback(cb);
            }
            Box::new(c)
        }
    };
    Ok(converter)
}
