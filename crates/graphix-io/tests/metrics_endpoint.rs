use graphix_core::{
    CachedState, FrameCodec, ManualClock, Reading, ScrapeConfig, ScrapeController, StateExchange,
    TickOutcome, Transport, TransportError,
};
use graphix_io::{serve_metrics, MetricsError, MetricsPublisher, MetricsServer};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const STALL: Duration = Duration::from_secs(1);

struct Harness {
    exchange: Arc<StateExchange>,
    stop: Arc<AtomicBool>,
    server: Option<MetricsServer>,
    addr: SocketAddr,
}

impl Harness {
    fn start(labels: BTreeMap<String, String>) -> Self {
        let exchange = Arc::new(StateExchange::new());
        let stop = Arc::new(AtomicBool::new(false));
        let server = serve_metrics(
            "127.0.0.1:0",
            Arc::clone(&exchange),
            MetricsPublisher::new(labels),
            Arc::clone(&stop),
        )
        .expect("listener binds");
        let addr = server.local_addr().expect("tcp listener");
        Self {
            exchange,
            stop,
            server: Some(server),
            addr,
        }
    }

    fn request(&self, method: &str, path: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(self.addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        write!(
            stream,
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
        )
        .unwrap();

        let mut raw = String::new();
        stream.read_to_string(&mut raw).unwrap();
        let status = raw
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .expect("status line");
        (status, raw)
    }

    fn get(&self, path: &str) -> (u16, String) {
        self.request("GET", path)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(server) = self.server.take() {
            let _ = server.join();
        }
    }
}

fn running(value: f64) -> CachedState {
    let mut state = CachedState::default();
    state.record_success(Reading::new(value, 1_700_000_000_000_000));
    state
}

#[test]
fn metrics_before_first_reading() {
    let harness = Harness::start(BTreeMap::new());
    let (status, body) = harness.get("/metrics");

    assert_eq!(status, 200);
    assert!(body.contains("text/plain; version=0.0.4"));
    assert!(body.contains("graphix_scraper_status{status=\"starting\"} 1"));
    assert!(!body.contains("graphix_pressure_pascals"));
}

#[test]
fn metrics_follow_published_state() {
    let harness = Harness::start(BTreeMap::new());
    harness.exchange.publish(running(0.0125));

    let (status, body) = harness.get("/metrics");
    assert_eq!(status, 200);
    assert!(body.contains("graphix_pressure_pascals 0.0125"));
    assert!(body.contains("graphix_scraper_status{status=\"running\"} 1"));
}

#[test]
fn constant_labels_reach_the_wire() {
    let mut labels = BTreeMap::new();
    labels.insert("site".to_string(), "lab1".to_string());
    let harness = Harness::start(labels);
    harness.exchange.publish(running(13.4));

    let (_, body) = harness.get("/metrics");
    assert!(body.contains("graphix_pressure_pascals{site=\"lab1\"} 13.4"));
}

#[test]
fn health_and_readiness() {
    let harness = Harness::start(BTreeMap::new());
    assert_eq!(harness.get("/health").0, 200);
    assert_eq!(harness.get("/ready").0, 503);

    harness.exchange.publish(running(1.0));
    assert_eq!(harness.get("/ready").0, 200);
}

#[test]
fn unknown_path_and_method() {
    let harness = Harness::start(BTreeMap::new());
    assert_eq!(harness.get("/nope").0, 404);

    let (status, raw) = harness.request("POST", "/metrics");
    assert_eq!(status, 405);
    assert!(raw.contains("Allow: GET"));
}

#[test]
fn query_string_is_ignored() {
    let harness = Harness::start(BTreeMap::new());
    assert_eq!(harness.get("/metrics?name[]=graphix_scraper_status").0, 200);
}

#[test]
fn port_in_use_is_reported() {
    let first = Harness::start(BTreeMap::new());
    let err = serve_metrics(
        &first.addr.to_string(),
        Arc::new(StateExchange::new()),
        MetricsPublisher::default(),
        Arc::new(AtomicBool::new(false)),
    )
    .err()
    .expect("second bind fails");
    assert!(matches!(err, MetricsError::Bind { .. }));
}

/// Answers the first request at once, then hangs on every later one.
struct StallingGauge {
    codec: FrameCodec,
    answered: bool,
    stalled: mpsc::Sender<()>,
}

impl Transport for StallingGauge {
    fn exchange(&mut self, _request: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !self.answered {
            self.answered = true;
            return Ok(self.codec.encode_response("1.25E-02"));
        }
        let _ = self.stalled.send(());
        thread::sleep(STALL);
        Err(TransportError::Timeout(timeout))
    }
}

#[test]
fn blocked_exchange_does_not_stall_metrics() {
    let harness = Harness::start(BTreeMap::new());
    let (stalled_tx, stalled_rx) = mpsc::channel();
    let mut controller = ScrapeController::new(
        StallingGauge {
            codec: FrameCodec::default(),
            answered: false,
            stalled: stalled_tx,
        },
        FrameCodec::default(),
        ScrapeConfig::default(),
        Arc::clone(&harness.exchange),
        Arc::new(ManualClock::new(1_700_000_000_000_000)),
    );

    let scraper = thread::spawn(move || {
        let first = controller.tick();
        let second = controller.tick();
        (first, second)
    });

    stalled_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("second exchange starts");
    let start = Instant::now();
    let (status, body) = harness.get("/metrics");
    let elapsed = start.elapsed();

    assert_eq!(status, 200);
    assert!(elapsed < STALL / 2, "scrape took {elapsed:?}");
    assert!(body.contains("graphix_pressure_pascals 0.0125"));
    assert!(body.contains("graphix_scraper_status{status=\"running\"} 1"));
    assert!(body.contains("graphix_scrapes_total 1"));

    let (first, second) = scraper.join().expect("scrape thread");
    assert!(first.is_success());
    assert!(matches!(second, TickOutcome::Failure(_)));

    let (_, body) = harness.get("/metrics");
    assert!(body.contains("graphix_pressure_pascals 0.0125"));
    assert!(body.contains("graphix_scraper_status{status=\"error\"} 1"));
}
