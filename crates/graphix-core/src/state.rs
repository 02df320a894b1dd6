use crate::status::{ScrapeFailure, ScrapeStatus};
use std::sync::RwLock;

/// A decoded pressure value. Superseded by the next reading, never mutated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    value_pa: f64,
    acquired_unix_us: u64,
}

impl Reading {
    pub fn new(value_pa: f64, acquired_unix_us: u64) -> Self {
        Self {
            value_pa,
            acquired_unix_us,
        }
    }

    pub fn value_pa(&self) -> f64 {
        self.value_pa
    }

    pub fn acquired_unix_us(&self) -> u64 {
        self.acquired_unix_us
    }

    pub fn acquired_unix_secs(&self) -> f64 {
        self.acquired_unix_us as f64 / 1_000_000.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeCounters {
    pub ticks: u64,
    pub successes: u64,
    failures: [u64; ScrapeFailure::ALL.len()],
}

impl ScrapeCounters {
    pub fn failures(&self, kind: ScrapeFailure) -> u64 {
        self.failures[kind.index()]
    }

    pub fn total_failures(&self) -> u64 {
        self.failures.iter().sum()
    }

    fn note_failure(&mut self, kind: ScrapeFailure) {
        self.failures[kind.index()] += 1;
    }
}

/// Everything a metrics consumer sees, published as one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CachedState {
    pub status: ScrapeStatus,
    pub reading: Option<Reading>,
    pub last_failure: Option<ScrapeFailure>,
    pub counters: ScrapeCounters,
}

impl CachedState {
    pub fn record_success(&mut self, reading: Reading) {
        self.status = self.status.on_success();
        self.reading = Some(reading);
        self.last_failure = None;
        self.counters.ticks += 1;
        self.counters.successes += 1;
    }

    /// The previous reading stays in place so consumers can tell stale from absent.
    pub fn record_failure(&mut self, failure: ScrapeFailure) {
        self.status = self.status.on_failure();
        self.last_failure = Some(failure);
        self.counters.ticks += 1;
        self.counters.note_failure(failure);
    }
}

/// Single-writer, many-reader hand-off of [`CachedState`].
#[derive(Debug, Default)]
pub struct StateExchange {
    state: RwLock<CachedState>,
}

impl StateExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the scrape controller after every tick.
    pub fn publish(&self, state: CachedState) {
        let mut slot = self.state.write().unwrap_or_else(|e| e.into_inner());
        *slot = state;
    }

    /// Called by metrics handlers; always returns a consistent whole.
    pub fn snapshot(&self) -> CachedState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }
}
