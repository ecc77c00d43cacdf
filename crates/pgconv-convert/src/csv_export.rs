//! Tabular-text (CSV) output
//!
//! The header comes from the first row's keys. Later rows are written against
//! that header: missing keys become empty cells, extra keys are dropped, and
//! each drifting row is reported as an `InconsistentKeys` warning.

use async_trait::async_trait;
use csv::{QuoteStyle, Terminator, WriterBuilder};

use pgconv_core::{ConvertError, CsvOptions, Result, Row, TextEncoding};

use crate::converter::{
    ConversionReport, ConvertPhase, ConvertWarning, FormatPipeline, OutputFormat,
    ProgressCallback, ProgressLevel, ProgressReporter, key_drift_warnings,
};
use crate::normalize::to_tabular_text;
use crate::sink::{SinkDescriptor, write_atomically};

/// Header and cell text for every row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvTable {
    pub header: Vec<String>,
    pub records: Vec<Vec<String>>,
}

/// Writes the dataset as delimited text
pub struct CsvConverter {
    delimiter: u8,
    quote: u8,
    encoding: TextEncoding,
    reporter: ProgressReporter,
}

impl CsvConverter {
    pub fn new(delimiter: u8, quote: u8, encoding: TextEncoding) -> Self {
        Self {
            delimiter,
            quote,
            encoding,
            reporter: ProgressReporter::new(OutputFormat::Csv),
        }
    }

    pub fn from_options(options: &CsvOptions) -> Result<Self> {
        Ok(Self::new(
            options.delimiter_byte()?,
            options.quote_byte()?,
            options.text_encoding()?,
        ))
    }

    /// Set progress callback
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.reporter.set_callback(callback);
        self
    }

    /// Encode the table as delimited text in the configured encoding
    pub fn encode_table(&self, table: &CsvTable) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quote)
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        if !table.records.is_empty() {
            writer.write_record(&table.header).map_err(csv_error)?;
            for record in &table.records {
                writer.write_record(record).map_err(csv_error)?;
            }
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| ConvertError::Encoding(e.to_string()))?;
        match self.encoding {
            TextEncoding::Utf8 => Ok(bytes),
            encoding => {
                let text = String::from_utf8(bytes)
                    .map_err(|e| ConvertError::Encoding(e.to_string()))?;
                encoding.encode(&text)
            }
        }
    }
}

impl Default for CsvConverter {
    fn default() -> Self {
        Self::new(b',', b'"', TextEncoding::Utf8)
    }
}

fn csv_error(e: csv::Error) -> ConvertError {
    ConvertError::Encoding(e.to_string())
}

#[async_trait]
impl FormatPipeline for CsvConverter {
    type Prepared = CsvTable;

    fn output_format(&self) -> OutputFormat {
        OutputFormat::Csv
    }

    fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    fn validate(&self, dataset: &[Row]) -> Result<Vec<ConvertWarning>> {
        Ok(key_drift_warnings(dataset))
    }

    fn preprocess(&self, dataset: &[Row]) -> Result<Self::Prepared> {
        let Some(first) = dataset.first() else {
            return Ok(CsvTable::default());
        };
        let header: Vec<String> = first.columns().map(str::to_string).collect();
        let total = dataset.len();

        let records = dataset
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let record = header
                    .iter()
                    .map(|column| row.get(column).map(to_tabular_text).unwrap_or_default())
                    .collect();
                self.reporter.preprocess_tick(index + 1, total);
                record
            })
            .collect();

        Ok(CsvTable { header, records })
    }

    async fn render(&self, table: Self::Prepared, sink: &SinkDescriptor) -> Result<ConversionReport> {
        let path = sink.require_file(OutputFormat::Csv.name())?;
        let rows = table.records.len() as u64;
        self.reporter.report(
            ConvertPhase::Writing,
            ProgressLevel::Info,
            0,
            rows,
            format!("Writing {} rows to {} ({})", rows, path.display(), self.encoding.name()),
        );

        let bytes = self.encode_table(&table)?;
        write_atomically(path, |writer| {
            writer.write_all(&bytes)?;
            Ok(())
        })?;

        let mut report = ConversionReport::new(OutputFormat::Csv);
        report.rows = rows;
        report.artifact = Some(path.to_path_buf());
        Ok(report)
    }
}
