mod app;
mod config;
mod logging;
mod telemetry;

pub use app::{open_link, run, run_from_args, AppError, GaugeLink};
pub use config::{ConfigError, RuntimeConfig};
pub use logging::{init_tracing, LoggingError, LoggingOptions};
