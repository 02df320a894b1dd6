use graphix_core::{
    FrameCodec, IntervalScheduler, ManualClock, Reading, ScrapeConfig, ScrapeController,
    ScrapeFailure, ScrapeStatus, ScriptedTransport, SimulatedGauge, StateExchange, TickOutcome,
    TransportError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn response(value: &str) -> Result<Vec<u8>, TransportError> {
    Ok(FrameCodec::default().encode_response(value))
}

fn timeout() -> Result<Vec<u8>, TransportError> {
    Err(TransportError::Timeout(Duration::from_secs(1)))
}

fn scripted(
    script: Vec<Result<Vec<u8>, TransportError>>,
) -> (
    ScrapeController<ScriptedTransport>,
    Arc<StateExchange>,
    Arc<ManualClock>,
) {
    let exchange = Arc::new(StateExchange::new());
    let clock = Arc::new(ManualClock::new(1_000_000));
    let controller = ScrapeController::new(
        ScriptedTransport::new(script),
        FrameCodec::default(),
        ScrapeConfig::default(),
        Arc::clone(&exchange),
        clock.clone(),
    );
    (controller, exchange, clock)
}

#[test]
fn first_success_moves_to_running() {
    let (mut ctl, exchange, _) = scripted(vec![response("1.25E-02")]);
    assert_eq!(exchange.snapshot().status, ScrapeStatus::Starting);

    ctl.tick();
    let state = exchange.snapshot();
    assert_eq!(state.status, ScrapeStatus::Running);
    assert_eq!(state.reading.map(|r| r.value_pa()), Some(0.0125));
}

#[test]
fn timeout_while_running_keeps_reading() {
    let (mut ctl, exchange, clock) = scripted(vec![response("10.0"), timeout()]);
    ctl.tick();
    let before = exchange.snapshot().reading;

    clock.advance(5_000_000);
    assert_eq!(
        ctl.tick(),
        TickOutcome::Failure(ScrapeFailure::TransportTimeout)
    );
    let after = exchange.snapshot();
    assert_eq!(after.status, ScrapeStatus::Error);
    assert_eq!(after.reading, before);
    assert_eq!(after.reading, Some(Reading::new(10.0, 1_000_000)));
}

#[test]
fn success_timeout_success_sequence() {
    let (mut ctl, exchange, clock) =
        scripted(vec![response("10.0"), timeout(), response("10.5")]);

    let mut statuses = Vec::new();
    for _ in 0..3 {
        ctl.tick();
        clock.advance(5_000_000);
        let state = exchange.snapshot();
        assert!(state.reading.is_some(), "reading vanished after first success");
        statuses.push(state.status);
    }

    assert_eq!(
        statuses,
        [
            ScrapeStatus::Running,
            ScrapeStatus::Error,
            ScrapeStatus::Running
        ]
    );
    let last = exchange.snapshot().reading.unwrap();
    assert_eq!(last.value_pa(), 10.5);
    assert_eq!(last.acquired_unix_us(), 11_000_000);
}

#[test]
fn checksum_failure_leaves_cached_reading_alone() {
    let mut corrupted = FrameCodec::default().encode_response("2.00E+01");
    let crc_at = corrupted.len() - 2;
    corrupted[crc_at] ^= 0x02;

    let (mut ctl, exchange, _) = scripted(vec![response("1.00E+01"), Ok(corrupted)]);
    ctl.tick();
    let good = exchange.snapshot();

    assert_eq!(
        ctl.tick(),
        TickOutcome::Failure(ScrapeFailure::ChecksumMismatch)
    );
    let after = exchange.snapshot();
    assert_eq!(after.reading, good.reading);
    assert_eq!(after.status, ScrapeStatus::Error);
    assert_eq!(
        after.counters.failures(ScrapeFailure::ChecksumMismatch),
        1
    );
}

#[test]
fn failure_before_first_success_has_no_reading() {
    let (mut ctl, exchange, _) = scripted(vec![Ok(vec![0x06, 0x04])]);
    assert_eq!(ctl.tick(), TickOutcome::Failure(ScrapeFailure::FrameTooShort));
    let state = exchange.snapshot();
    assert_eq!(state.status, ScrapeStatus::Error);
    assert!(state.reading.is_none());
}

#[test]
fn transport_io_error_is_recoverable() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged");
    let (mut ctl, exchange, _) = scripted(vec![Err(io.into()), response("3.0")]);
    assert_eq!(ctl.tick(), TickOutcome::Failure(ScrapeFailure::TransportIo));
    assert!(ctl.tick().is_success());
    assert_eq!(exchange.snapshot().status, ScrapeStatus::Running);
}

#[test]
fn scheduled_loop_against_simulated_gauge() {
    let exchange = Arc::new(StateExchange::new());
    let stop = Arc::new(AtomicBool::new(false));
    let config = ScrapeConfig {
        interval: Duration::from_millis(10),
        timeout: Duration::from_millis(10),
        max_backoff: Duration::from_millis(10),
        ..ScrapeConfig::default()
    };

    let handle = {
        let exchange = Arc::clone(&exchange);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut scheduler = IntervalScheduler::new(config.interval, config.max_backoff);
            let mut ctl = ScrapeController::new(
                SimulatedGauge::default(),
                FrameCodec::default(),
                config,
                exchange,
                Arc::new(graphix_core::SystemClock),
            );
            ctl.run(&mut scheduler, &stop);
            *ctl.state()
        })
    };

    let mut waited = Duration::ZERO;
    while exchange.snapshot().counters.successes < 3 && waited < Duration::from_secs(5) {
        thread::sleep(Duration::from_millis(10));
        waited += Duration::from_millis(10);
    }
    stop.store(true, Ordering::Relaxed);
    let final_state = handle.join().unwrap();

    assert_eq!(final_state.status, ScrapeStatus::Running);
    assert!(final_state.counters.successes >= 3);
    assert_eq!(final_state.counters.total_failures(), 0);
    assert_eq!(exchange.snapshot(), final_state);
}
