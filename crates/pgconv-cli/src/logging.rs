//! Logging setup for the `pgconv` binary
//!
//! Console output goes to stderr so that stdout stays usable for data such
//! as `--list-tables`. When `[logging] file` is set, a JSON layer is added
//! that writes through a non-blocking appender.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use pgconv_core::LoggingOptions;

/// Crates whose events follow the configured level; everything else is `warn`
const PGCONV_TARGETS: &[&str] = &["pgconv", "pgconv_core", "pgconv_convert", "pgconv_driver_postgres"];

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,

    /// JSON log file, if any
    pub log_file: Option<PathBuf>,

    /// Whether to include file/line information in console logs
    pub include_location: bool,

    /// Whether to log span open/close events
    pub enable_spans: bool,
}

impl LoggingConfig {
    /// Build from the `[logging]` options; `verbose` forces `debug`
    pub fn from_options(options: &LoggingOptions, verbose: bool) -> Self {
        let level = if verbose { "debug" } else { options.level.as_str() };
        Self {
            default_filter: default_filter(level),
            log_file: options.file.clone(),
            include_location: verbose,
            enable_spans: verbose,
        }
    }
}

/// `warn` for dependencies, `level` for our own crates
pub fn default_filter(level: &str) -> String {
    let level = level.trim().to_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(PGCONV_TARGETS.iter().map(|target| format!("{}={}", target, level)));
    directives.join(",")
}

/// Initialize the global subscriber
///
/// The returned guard flushes the file layer on drop and must be kept alive
/// until the program exits.
pub fn init(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .with_context(|| format!("invalid log filter {:?}", config.default_filter))?;

    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.include_location)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(span_events.clone())
        .compact()
        .with_filter(env_filter.clone())
        .boxed();
    layers.push(console_layer);

    let mut guard = None;
    if let Some(path) = &config.log_file {
        let (directory, file_name) = split_log_path(path)?;
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("cannot create log directory {}", directory.display()))?;

        let file_appender = tracing_appender::rolling::never(&directory, file_name);
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter)
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        log_file = ?config.log_file,
        filter = %config.default_filter,
        "logging initialized"
    );
    Ok(guard)
}

fn split_log_path(path: &Path) -> anyhow::Result<(PathBuf, &std::ffi::OsStr)> {
    let file_name = path
        .file_name()
        .with_context(|| format!("log file path {} has no file name", path.display()))?;
    let directory = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((directory, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(
            default_filter("INFO"),
            "warn,pgconv=info,pgconv_core=info,pgconv_convert=info,pgconv_driver_postgres=info"
        );
    }

    #[test]
    fn test_verbose_forces_debug() {
        let options = LoggingOptions::default();
        let config = LoggingConfig::from_options(&options, true);
        assert!(config.default_filter.contains("pgconv_convert=debug"));
        assert!(config.enable_spans);

        let quiet = LoggingConfig::from_options(&options, false);
        assert!(quiet.default_filter.contains("pgconv_convert=info"));
        assert!(quiet.log_file.is_none());
    }

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new("logs/pgconv.log")).unwrap();
        assert_eq!(dir, PathBuf::from("logs"));
        assert_eq!(name, "pgconv.log");

        let (dir, _) = split_log_path(Path::new("pgconv.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));

        assert!(split_log_path(Path::new("/")).is_err());
    }
}
