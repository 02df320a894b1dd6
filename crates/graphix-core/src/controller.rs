use crate::clock::Clock;
use crate::codec::{Command, FrameCodec};
use crate::schedule::Scheduler;
use crate::state::{CachedState, Reading, StateExchange};
use crate::status::ScrapeFailure;
use crate::transport::Transport;
use log::{debug, info, warn};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ScrapeConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub max_backoff: Duration,
    /// Treat `<= 0` as line noise instead of a reading.
    pub reject_non_positive: bool,
    pub command: Command,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            reject_non_positive: false,
            command: Command::ReadPressure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Success(Reading),
    Failure(ScrapeFailure),
}

impl TickOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TickOutcome::Success(_))
    }
}

/// Owns the gauge link and the only writable copy of [`CachedState`].
pub struct ScrapeController<T: Transport> {
    transport: T,
    codec: FrameCodec,
    config: ScrapeConfig,
    exchange: Arc<StateExchange>,
    clock: Arc<dyn Clock>,
    state: CachedState,
}

impl<T: Transport> ScrapeController<T> {
    pub fn new(
        transport: T,
        codec: FrameCodec,
        config: ScrapeConfig,
        exchange: Arc<StateExchange>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = exchange.snapshot();
        Self {
            transport,
            codec,
            config,
            exchange,
            clock,
            state,
        }
    }

    /// One scrape: exactly one exchange, no in-tick retry. Every error ends here.
    pub fn tick(&mut self) -> TickOutcome {
        let outcome = match self.scrape() {
            Ok(reading) => TickOutcome::Success(reading),
            Err(failure) => TickOutcome::Failure(failure),
        };

        let previous = self.state.status;
        match outcome {
            TickOutcome::Success(reading) => {
                debug!("pressure {} Pa", reading.value_pa());
                self.state.record_success(reading);
            }
            TickOutcome::Failure(failure) => self.state.record_failure(failure),
        }
        if previous != self.state.status {
            info!(
                "scraper status {} -> {} ({})",
                previous,
                self.state.status,
                self.transport.describe()
            );
        }

        self.exchange.publish(self.state);
        outcome
    }

    pub fn run<S: Scheduler>(&mut self, scheduler: &mut S, stop: &AtomicBool) {
        info!(
            "scrape loop started: interval {:?}, timeout {:?}, link {}",
            self.config.interval,
            self.config.timeout,
            self.transport.describe()
        );
        while scheduler.wait_next(stop) {
            let outcome = self.tick();
            scheduler.record(&outcome);
        }
        info!(
            "scrape loop stopped after {} ticks ({} failed)",
            self.state.counters.ticks,
            self.state.counters.total_failures()
        );
    }

    pub fn state(&self) -> &CachedState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn scrape(&mut self) -> Result<Reading, ScrapeFailure> {
        let request = self.codec.encode_request(&self.config.command).map_err(|e| {
            warn!("cannot encode {}: {}", self.config.command, e);
            ScrapeFailure::from(&e)
        })?;

        let response = self
            .transport
            .exchange(&request, self.config.timeout)
            .map_err(|e| {
                warn!("gauge exchange failed: {}", e);
                ScrapeFailure::from(&e)
            })?;

        let reading = self
            .codec
            .decode_response(&response, self.clock.unix_us())
            .map_err(|e| {
                warn!("rejected gauge response {:02x?}: {}", response, e);
                ScrapeFailure::from(&e)
            })?;

        if self.config.reject_non_positive && reading.value_pa() <= 0.0 {
            warn!("discarding non-positive reading {} Pa", reading.value_pa());
            return Err(ScrapeFailure::Implausible);
        }
        Ok(reading)
    }
}
