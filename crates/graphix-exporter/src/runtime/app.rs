use crate::runtime::config::{ConfigError, RuntimeConfig};
use crate::runtime::logging::{init_tracing, LoggingError};
use crate::runtime::telemetry;
use graphix_core::{
    CachedState, FrameCodec, IntervalScheduler, ScrapeController, SimulatedGauge, StateExchange,
    SystemClock, Transport, TransportError,
};
use graphix_io::MetricsError;
#[cfg(feature = "serial")]
use graphix_io::SerialTransport;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("failed to open gauge link: {0}")]
    Link(#[source] TransportError),

    #[error("serial support is not compiled in; rebuild with the `serial` feature or use --simulate")]
    SerialUnavailable,

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("failed to start scrape thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("scrape thread panicked")]
    ControllerPanicked,
}

/// The gauge link selected at startup.
pub enum GaugeLink {
    Simulated(SimulatedGauge),
    #[cfg(feature = "serial")]
    Serial(SerialTransport),
}

impl Transport for GaugeLink {
    fn exchange(&mut self, request: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
        match self {
            Self::Simulated(g) => g.exchange(request, timeout),
            #[cfg(feature = "serial")]
            Self::Serial(s) => s.exchange(request, timeout),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Simulated(g) => g.describe(),
            #[cfg(feature = "serial")]
            Self::Serial(s) => s.describe(),
        }
    }
}

pub fn open_link(config: &RuntimeConfig) -> Result<GaugeLink, AppError> {
    if config.simulate {
        info!("Using simulated gauge");
        return Ok(GaugeLink::Simulated(SimulatedGauge::new(config.frame)));
    }
    open_serial(config)
}

#[cfg(feature = "serial")]
fn open_serial(config: &RuntimeConfig) -> Result<GaugeLink, AppError> {
    let port = config
        .serial_port
        .as_deref()
        .ok_or_else(|| ConfigError::Invalid("no serial port configured".into()))?;
    info!(port, baud_rate = config.baud_rate, "Connecting to gauge");
    let serial = SerialTransport::open(port, config.baud_rate, config.frame.terminator)
        .map_err(AppError::Link)?;
    Ok(GaugeLink::Serial(serial))
}

#[cfg(not(feature = "serial"))]
fn open_serial(_config: &RuntimeConfig) -> Result<GaugeLink, AppError> {
    Err(AppError::SerialUnavailable)
}

pub fn run_from_args() -> ExitCode {
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Run with --help for usage.");
            return ExitCode::from(2);
        }
    };
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }

    let _log_guard = match init_tracing(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Exporter stopped");
            ExitCode::FAILURE
        }
    }
}

pub fn run(config: RuntimeConfig) -> Result<(), AppError> {
    if let Some(ref path) = config.config_path {
        info!(path = %path.display(), "Loaded configuration file");
    }

    let exchange = Arc::new(StateExchange::new());
    let stop = Arc::new(AtomicBool::new(false));
    let scrape_config = config.scrape_config();
    let link = open_link(&config)?;

    let metrics =
        telemetry::start_metrics_server(&config, Arc::clone(&exchange), Arc::clone(&stop))?;

    info!(
        link = %link.describe(),
        interval_ms = scrape_config.interval.as_millis() as u64,
        timeout_ms = scrape_config.timeout.as_millis() as u64,
        max_backoff_ms = scrape_config.max_backoff.as_millis() as u64,
        reject_non_positive = scrape_config.reject_non_positive,
        "Starting scrape loop"
    );

    let controller_handle = {
        let exchange = Arc::clone(&exchange);
        let stop = Arc::clone(&stop);
        let codec = FrameCodec::new(config.frame);
        thread::Builder::new()
            .name("graphix-scrape".to_string())
            .spawn(move || {
                let mut scheduler =
                    IntervalScheduler::new(scrape_config.interval, scrape_config.max_backoff);
                let mut controller = ScrapeController::new(
                    link,
                    codec,
                    scrape_config,
                    exchange,
                    Arc::new(SystemClock),
                );
                controller.run(&mut scheduler, &stop);
                (*controller.state(), scheduler.overruns())
            })
    };
    let controller_handle = match controller_handle {
        Ok(handle) => handle,
        Err(e) => {
            stop.store(true, Ordering::Relaxed);
            let _ = metrics.join();
            return Err(AppError::Spawn(e));
        }
    };

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        thread::sleep(Duration::from_secs(seconds));
        stop.store(true, Ordering::Relaxed);
    }

    let joined = controller_handle.join();
    stop.store(true, Ordering::Relaxed);
    let _ = metrics.join();

    let (state, overruns) = joined.map_err(|_| AppError::ControllerPanicked)?;
    log_summary(&state, overruns);
    Ok(())
}

fn log_summary(state: &CachedState, overruns: u64) {
    info!(
        status = %state.status,
        ticks = state.counters.ticks,
        successes = state.counters.successes,
        failures = state.counters.total_failures(),
        overruns,
        last_pressure_pa = ?state.reading.map(|r| r.value_pa()),
        "Run complete"
    );
}
