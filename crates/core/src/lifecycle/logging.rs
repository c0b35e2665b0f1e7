//! Logging initialization with optional JSON output and file-based daily rotation.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::{Config, LogFormat};

/// Options for [`init_logging`], usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: String,
    pub format: LogFormat,
    pub to_file: bool,
    pub log_dir: Option<String>,
    pub file_name: String,
}

impl LogOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            level: config.log_level.clone(),
            format: config.log_format,
            to_file: config.logging_to_file,
            log_dir: config.log_dir.clone(),
            file_name: format!("{}.log", config.project_name),
        }
    }
}

/// Initialize the tracing subscriber.
///
/// - `to_file=true` → daily rotating file appender with non-blocking writer
/// - `to_file=false` → stderr output (default)
///
/// `RUST_LOG` overrides `level` when set. Returns an `Option<WorkerGuard>`
/// that **must be held** for the lifetime of the application to ensure
/// buffered logs are flushed on shutdown.
pub fn init_logging(options: &LogOptions) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&options.level));

    let (writer, guard) = if options.to_file {
        let dir = options.log_dir.as_deref().unwrap_or("./logs");
        let file_appender = tracing_appender::rolling::daily(dir, &options.file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        (BoxMakeWriter::new(non_blocking), Some(guard))
    } else {
        (BoxMakeWriter::new(std::io::stderr), None)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(!options.to_file);

    match options.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    guard
}
