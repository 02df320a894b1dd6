use std::path::PathBuf;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "info,graphix_exporter=debug,graphix_core=debug";
const DEBUG_FILTER: &str = "debug";
const LOG_FILE_PREFIX: &str = "graphix-exporter";

#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    pub json: bool,
    pub debug: bool,
    /// Console output goes to stderr instead of stdout.
    pub stderr: bool,
    /// Directory for a daily rolling log file next to the console output.
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log file appender: {0}")]
    Appender(#[from] rolling::InitError),

    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over `--debug`. Records from the `log` facade are
/// forwarded as well. Keep the returned guard alive until exit or buffered
/// file output is lost.
pub fn init_tracing(options: &LoggingOptions) -> Result<Option<WorkerGuard>, LoggingError> {
    let default_filter = if options.debug {
        DEBUG_FILTER
    } else {
        DEFAULT_FILTER
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);

    let console_layer: BoxedLayer<_> = match (options.json, options.stderr) {
        (true, false) => Box::new(fmt::layer().json()),
        (true, true) => Box::new(fmt::layer().json().with_writer(std::io::stderr)),
        (false, false) => Box::new(fmt::layer().pretty()),
        (false, true) => Box::new(fmt::layer().pretty().with_writer(std::io::stderr)),
    };

    let (file_layer, guard): (Option<BoxedLayer<_>>, Option<WorkerGuard>) =
        match options.log_dir {
            Some(ref dir) => {
                let appender = RollingFileAppender::builder()
                    .rotation(Rotation::DAILY)
                    .filename_prefix(LOG_FILE_PREFIX)
                    .filename_suffix("log")
                    .build(dir)?;
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer: BoxedLayer<_> = if options.json {
                    Box::new(fmt::layer().json().with_writer(writer))
                } else {
                    Box::new(fmt::layer().with_ansi(false).with_writer(writer))
                };
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

    registry.with(console_layer).with(file_layer).try_init()?;
    Ok(guard)
}
