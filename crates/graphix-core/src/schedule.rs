use crate::controller::TickOutcome;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound on how long a stop request can go unnoticed while waiting.
const STOP_POLL_SLICE: Duration = Duration::from_millis(50);

/// Decides when the next scrape tick fires.
pub trait Scheduler {
    /// Blocks until the next tick is due. Returns `false` once `stop` is set.
    fn wait_next(&mut self, stop: &AtomicBool) -> bool;

    /// Feedback from the tick that just ran.
    fn record(&mut self, _outcome: &TickOutcome) {}
}

/// Fixed-period scheduler with optional exponential backoff while the gauge is failing.
///
/// The first tick fires immediately. After a failure the next delay is the
/// current backoff, which doubles up to `max_backoff`; a success resets it to
/// the base interval. Each tick still makes exactly one attempt.
#[derive(Debug, Clone)]
pub struct IntervalScheduler {
    interval: Duration,
    max_backoff: Duration,
    backoff: Duration,
    delay: Duration,
    last_tick: Option<Instant>,
    overruns: u64,
}

impl IntervalScheduler {
    pub fn new(interval: Duration, max_backoff: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        Self {
            interval,
            max_backoff: max_backoff.max(interval),
            backoff: interval,
            delay: interval,
            last_tick: None,
            overruns: 0,
        }
    }

    /// Delay that will separate the last tick from the next one.
    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    /// Ticks that started late because the previous one ran past its slot.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn mark_failure(&mut self) {
        self.delay = self.backoff;
        self.backoff = self.backoff.saturating_mul(2).min(self.max_backoff);
    }

    pub fn mark_success(&mut self) {
        self.delay = self.interval;
        self.backoff = self.interval;
    }
}

impl Scheduler for IntervalScheduler {
    fn wait_next(&mut self, stop: &AtomicBool) -> bool {
        if let Some(last) = self.last_tick {
            // A delay past the end of the clock waits for `stop` alone.
            let due = last.checked_add(self.delay);
            if due.is_some_and(|due| Instant::now() > due) {
                self.overruns += 1;
            }
            while !stop.load(Ordering::Relaxed) {
                let now = Instant::now();
                let slice = match due {
                    Some(due) if now >= due => break,
                    Some(due) => (due - now).min(STOP_POLL_SLICE),
                    None => STOP_POLL_SLICE,
                };
                thread::sleep(slice);
            }
        }

        if stop.load(Ordering::Relaxed) {
            return false;
        }
        self.last_tick = Some(Instant::now());
        true
    }

    fn record(&mut self, outcome: &TickOutcome) {
        if outcome.is_success() {
            self.mark_success();
        } else {
            self.mark_failure();
        }
    }
}
