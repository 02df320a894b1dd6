//! Prometheus exposition for the scraper state.
//!
//! Each request renders the current [`CachedState`] snapshot into a fresh
//! registry. Nothing is kept between scrapes.

use graphix_core::tags;
use graphix_core::{CachedState, ScrapeFailure, ScrapeStatus, StateExchange};
use prometheus::{Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tiny_http::{Header, Method, Request, Response, Server};

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
const ACCEPT_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metric registry error: {0}")]
    Registry(#[from] prometheus::Error),

    #[error("exposition body is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("failed to bind metrics listener on {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("failed to start metrics thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Renders [`CachedState`] snapshots as Prometheus text.
#[derive(Debug, Clone)]
pub struct MetricsPublisher {
    labels: BTreeMap<String, String>,
    program_name: String,
    program_version: String,
}

impl Default for MetricsPublisher {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl MetricsPublisher {
    /// `labels` are attached to every series.
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self {
            labels,
            program_name: "graphix-exporter".to_string(),
            program_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_program(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.program_name = name.into();
        self.program_version = version.into();
        self
    }

    pub fn render(&self, state: &CachedState) -> Result<String, MetricsError> {
        let const_labels: HashMap<String, String> = self
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let registry = if const_labels.is_empty() {
            Registry::new()
        } else {
            Registry::new_custom(None, Some(const_labels))?
        };

        if let Some(reading) = state.reading {
            let pressure = Gauge::new(tags::PRESSURE_PA.metric, tags::PRESSURE_PA.help)?;
            pressure.set(reading.value_pa());
            registry.register(Box::new(pressure))?;

            let acquired = Gauge::new(
                tags::PRESSURE_TIMESTAMP.metric,
                tags::PRESSURE_TIMESTAMP.help,
            )?;
            acquired.set(reading.acquired_unix_secs());
            registry.register(Box::new(acquired))?;
        }

        let status = GaugeVec::new(
            Opts::new(tags::SCRAPER_STATUS.metric, tags::SCRAPER_STATUS.help),
            &[tags::SCRAPER_STATUS.key],
        )?;
        for candidate in ScrapeStatus::ALL {
            let value = if candidate == state.status { 1.0 } else { 0.0 };
            status.with_label_values(&[candidate.as_str()]).set(value);
        }
        registry.register(Box::new(status))?;

        let scrapes = IntCounter::new(tags::SCRAPES_TOTAL.metric, tags::SCRAPES_TOTAL.help)?;
        scrapes.inc_by(state.counters.ticks);
        registry.register(Box::new(scrapes))?;

        let failures = IntCounterVec::new(
            Opts::new(tags::SCRAPE_FAILURES.metric, tags::SCRAPE_FAILURES.help),
            &[tags::SCRAPE_FAILURES.key],
        )?;
        for kind in ScrapeFailure::ALL {
            failures
                .with_label_values(&[kind.as_str()])
                .inc_by(state.counters.failures(kind));
        }
        registry.register(Box::new(failures))?;

        let info = GaugeVec::new(
            Opts::new(tags::EXPORTER_INFO.metric, tags::EXPORTER_INFO.help),
            &["name", "version"],
        )?;
        info.with_label_values(&[&self.program_name, &self.program_version])
            .set(1.0);
        registry.register(Box::new(info))?;

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Handle to the running listener thread.
pub struct MetricsServer {
    local_addr: Option<SocketAddr>,
    handle: thread::JoinHandle<()>,
}

impl MetricsServer {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

/// Start the metrics HTTP server on the given address.
///
/// The socket is bound before this returns, so a bad address is reported to
/// the caller rather than from inside the thread. The thread exits once
/// `stop` is set.
pub fn serve_metrics(
    bind_addr: &str,
    exchange: Arc<StateExchange>,
    publisher: MetricsPublisher,
    stop: Arc<AtomicBool>,
) -> Result<MetricsServer, MetricsError> {
    let server = Server::http(bind_addr).map_err(|e| MetricsError::Bind {
        addr: bind_addr.to_string(),
        reason: e.to_string(),
    })?;
    let local_addr = server.server_addr().to_ip();

    match local_addr {
        Some(addr) => tracing::info!("Metrics server listening on http://{}/metrics", addr),
        None => tracing::info!("Metrics server listening on {}", bind_addr),
    }

    let handle = thread::Builder::new()
        .name("metrics-http".to_string())
        .spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                match server.recv_timeout(ACCEPT_POLL) {
                    Ok(Some(request)) => handle_request(request, &exchange, &publisher),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!("Metrics listener failed: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!("Metrics server stopped");
        })?;

    Ok(MetricsServer { local_addr, handle })
}

fn handle_request(request: Request, exchange: &StateExchange, publisher: &MetricsPublisher) {
    if *request.method() != Method::Get {
        let mut response = Response::from_string("Method Not Allowed").with_status_code(405);
        if let Ok(allow) = Header::from_bytes(&b"Allow"[..], &b"GET"[..]) {
            response.add_header(allow);
        }
        respond(request, response);
        return;
    }

    let path = request.url().split('?').next().unwrap_or_default().to_string();
    match path.as_str() {
        "/metrics" => {
            let snapshot = exchange.snapshot();
            match publisher.render(&snapshot) {
                Ok(body) => {
                    let mut response = Response::from_string(body);
                    if let Ok(content_type) =
                        Header::from_bytes(&b"Content-Type"[..], CONTENT_TYPE.as_bytes())
                    {
                        response.add_header(content_type);
                    }
                    respond(request, response);
                }
                Err(e) => {
                    tracing::warn!("Failed to encode metrics: {}", e);
                    respond(
                        request,
                        Response::from_string("Internal Server Error").with_status_code(500),
                    );
                }
            }
        }
        "/health" => respond(request, Response::from_string("OK")),
        "/ready" => {
            // Ready once the gauge has produced at least one reading
            if exchange.snapshot().reading.is_some() {
                respond(request, Response::from_string("Ready"));
            } else {
                respond(
                    request,
                    Response::from_string("Not Ready").with_status_code(503),
                );
            }
        }
        _ => respond(
            request,
            Response::from_string("Not Found").with_status_code(404),
        ),
    }
}

fn respond<R: std::io::Read>(request: Request, response: Response<R>) {
    if let Err(e) = request.respond(response) {
        tracing::debug!("Metrics client went away: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphix_core::Reading;

    fn sample_value(body: &str, series: &str) -> Option<f64> {
        body.lines()
            .filter(|l| !l.starts_with('#'))
            .find(|l| l.starts_with(series))
            .and_then(|l| l.rsplit(' ').next())
            .and_then(|v| v.parse().ok())
    }

    #[test]
    fn untouched_state_has_status_but_no_pressure() {
        let body = MetricsPublisher::default()
            .render(&CachedState::default())
            .unwrap();

        assert!(!body.contains("graphix_pressure_pascals"));
        assert!(body.contains("# HELP graphix_scraper_status"));
        assert!(body.contains("# TYPE graphix_scraper_status gauge"));
        assert_eq!(
            sample_value(&body, "graphix_scraper_status{status=\"starting\"}"),
            Some(1.0)
        );
        assert_eq!(
            sample_value(&body, "graphix_scraper_status{status=\"running\"}"),
            Some(0.0)
        );
    }

    #[test]
    fn running_state_exposes_pressure() {
        let mut state = CachedState::default();
        state.record_success(Reading::new(0.0125, 1_700_000_000_000_000));
        let body = MetricsPublisher::default().render(&state).unwrap();

        assert!(body.contains("# TYPE graphix_pressure_pascals gauge"));
        assert_eq!(sample_value(&body, "graphix_pressure_pascals"), Some(0.0125));
        assert_eq!(
            sample_value(&body, "graphix_pressure_timestamp_seconds"),
            Some(1_700_000_000.0)
        );
        assert_eq!(
            sample_value(&body, "graphix_scraper_status{status=\"running\"}"),
            Some(1.0)
        );
        assert_eq!(sample_value(&body, "graphix_scrapes_total"), Some(1.0));
    }

    #[test]
    fn error_state_keeps_stale_pressure() {
        let mut state = CachedState::default();
        state.record_success(Reading::new(10.0, 0));
        state.record_failure(ScrapeFailure::TransportTimeout);
        let body = MetricsPublisher::default().render(&state).unwrap();

        assert_eq!(sample_value(&body, "graphix_pressure_pascals"), Some(10.0));
        assert_eq!(
            sample_value(&body, "graphix_scraper_status{status=\"error\"}"),
            Some(1.0)
        );
        assert_eq!(
            sample_value(
                &body,
                "graphix_scrape_failures_total{kind=\"transport_timeout\"}"
            ),
            Some(1.0)
        );
    }

    #[test]
    fn constant_labels_on_every_series() {
        let mut labels = BTreeMap::new();
        labels.insert("gauge_id".to_string(), "graphix001".to_string());
        let mut state = CachedState::default();
        state.record_success(Reading::new(5.0, 0));

        let body = MetricsPublisher::new(labels).render(&state).unwrap();
        for line in body.lines().filter(|l| !l.starts_with('#')) {
            assert!(
                line.contains("gauge_id=\"graphix001\""),
                "series without constant label: {line}"
            );
        }
    }

    #[test]
    fn program_info_is_exported() {
        let body = MetricsPublisher::default()
            .with_program("probe", "9.9.9")
            .render(&CachedState::default())
            .unwrap();
        let line = body
            .lines()
            .find(|l| l.starts_with("graphix_exporter_info{"))
            .unwrap();
        assert!(line.contains("name=\"probe\""));
        assert!(line.contains("version=\"9.9.9\""));
    }
}
