//! Structured-document (JSON) output

use async_trait::async_trait;
use std::path::Path;

use pgconv_core::{Result, Row};

use crate::converter::{
    ConversionReport, ConvertPhase, FormatPipeline, OutputFormat, ProgressCallback,
    ProgressLevel, ProgressReporter,
};
use crate::normalize::to_document_value;
use crate::sink::{SinkDescriptor, write_atomically};

/// Writes the dataset as an indented JSON array of objects
pub struct JsonConverter {
    reporter: ProgressReporter,
}

impl JsonConverter {
    pub fn new() -> Self {
        Self {
            reporter: ProgressReporter::new(OutputFormat::Json),
        }
    }

    /// Set progress callback
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.reporter.set_callback(callback);
        self
    }
}

impl Default for JsonConverter {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize every row into a JSON object, keeping column order
pub fn rows_to_documents<F>(
    dataset: &[Row],
    reporter: &ProgressReporter,
    normalize: F,
) -> Vec<serde_json::Value>
where
    F: Fn(&pgconv_core::Value) -> serde_json::Value,
{
    let total = dataset.len();
    dataset
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let object: serde_json::Map<String, serde_json::Value> = row
                .iter()
                .map(|(column, value)| (column.to_string(), normalize(value)))
                .collect();
            reporter.preprocess_tick(index + 1, total);
            serde_json::Value::Object(object)
        })
        .collect()
}

/// Serialize documents as a pretty-printed array into `path`
pub(crate) fn write_document_array(
    path: &Path,
    documents: &[serde_json::Value],
) -> Result<()> {
    write_atomically(path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, documents)?;
        writer.write_all(b"\n")?;
        Ok(())
    })
}

#[async_trait]
impl FormatPipeline for JsonConverter {
    type Prepared = Vec<serde_json::Value>;

    fn output_format(&self) -> OutputFormat {
        OutputFormat::Json
    }

    fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    fn preprocess(&self, dataset: &[Row]) -> Result<Self::Prepared> {
        Ok(rows_to_documents(dataset, &self.reporter, to_document_value))
    }

    async fn render(
        &self,
        documents: Self::Prepared,
        sink: &SinkDescriptor,
    ) -> Result<ConversionReport> {
        let path = sink.require_file(OutputFormat::Json.name())?;
        self.reporter.report(
            ConvertPhase::Writing,
            ProgressLevel::Info,
            0,
            documents.len() as u64,
            format!("Writing {} documents to {}", documents.len(), path.display()),
        );
        write_document_array(path, &documents)?;

        let mut report = ConversionReport::new(OutputFormat::Json);
        report.rows = documents.len() as u64;
        report.artifact = Some(path.to_path_buf());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::Converter;
    use pgconv_core::Value;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_rows_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let dataset = vec![
            Row::new().with("id", 1).with("name", "A"),
            Row::new().with("id", 2).with("name", "B"),
        ];

        let report = JsonConverter::new()
            .try_convert(&dataset, &SinkDescriptor::file(&path))
            .await
            .unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.artifact.as_deref(), Some(path.as_path()));

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!([{"id": 1, "name": "A"}, {"id": 2, "name": "B"}]));

        let keys: Vec<&String> = parsed[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["id", "name"]);
        assert!(text.contains("\n  {\n    \"id\": 1,"), "{text}");
    }

    #[tokio::test]
    async fn test_empty_dataset_writes_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        assert!(JsonConverter::new().convert(&[], &SinkDescriptor::file(&path)).await);
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "[]");
    }

    #[tokio::test]
    async fn test_null_is_kept_as_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nulls.json");
        let dataset = vec![Row::new().with("id", 1).with("deleted_at", Value::Null)];
        assert!(JsonConverter::new().convert(&dataset, &SinkDescriptor::file(&path)).await);

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed[0].get("deleted_at"), Some(&serde_json::Value::Null));
    }

    #[tokio::test]
    async fn test_connection_sink_is_unsupported() {
        let sink = SinkDescriptor::parse("mongodb://localhost");
        let dataset = vec![Row::new().with("id", 1)];
        assert!(!JsonConverter::new().convert(&dataset, &sink).await);
    }
}
