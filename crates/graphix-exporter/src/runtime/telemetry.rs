use crate::runtime::config::RuntimeConfig;
use graphix_core::StateExchange;
use graphix_io::{serve_metrics, MetricsError, MetricsPublisher, MetricsServer};
use std::sync::{atomic::AtomicBool, Arc};
use tracing::info;

pub fn build_publisher(config: &RuntimeConfig) -> MetricsPublisher {
    MetricsPublisher::new(config.labels.clone())
        .with_program(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

pub fn start_metrics_server(
    config: &RuntimeConfig,
    exchange: Arc<StateExchange>,
    stop: Arc<AtomicBool>,
) -> Result<MetricsServer, MetricsError> {
    info!(
        addr = %config.metrics_addr,
        labels = ?config.labels,
        "Starting metrics server"
    );
    serve_metrics(&config.metrics_addr, exchange, build_publisher(config), stop)
}
