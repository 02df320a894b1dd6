pub mod metrics;
#[cfg(feature = "serial")]
pub mod serial;

pub use metrics::{serve_metrics, MetricsError, MetricsPublisher, MetricsServer};
#[cfg(feature = "serial")]
pub use serial::SerialTransport;
