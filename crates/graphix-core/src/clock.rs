use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of acquisition timestamps. The codec itself is clockless.
pub trait Clock: Send + Sync {
    /// Wall-clock microseconds since the Unix epoch.
    fn unix_us(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

/// Clock advanced by hand, for deterministic timestamps in tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: AtomicU64,
}

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self {
            now_us: AtomicU64::new(start_us),
        }
    }

    pub fn advance(&self, delta_us: u64) {
        self.now_us.fetch_add(delta_us, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn unix_us(&self) -> u64 {
        self.now_us.load(Ordering::Acquire)
    }
}
