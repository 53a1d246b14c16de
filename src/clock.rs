//! Time source
//!
//! Every timestamp in the directory is an `i64` count of nanoseconds since the
//! Unix epoch. Components take an `Arc<dyn Clock>` so tests can pin time.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

pub const NANOS_PER_MINUTE: i64 = 60 * 1_000_000_000;

pub trait Clock: Send + Sync {
    /// Current time in nanoseconds since the Unix epoch
    fn now_nanos(&self) -> i64;
}

/// Wall clock backed by chrono
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        let now = Utc::now();
        // Only out of range past the year 2262
        now.timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
    }
}

/// Manually driven clock for deterministic tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_nanos: i64) -> Self {
        Self {
            now: AtomicI64::new(start_nanos),
        }
    }

    pub fn set(&self, nanos: i64) {
        self.now.store(nanos, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(duration_nanos(by), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Saturating conversion of a `Duration` into signed nanoseconds
pub fn duration_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

/// Timestamp `minutes` before `now`
pub fn minutes_before(now: i64, minutes: i64) -> i64 {
    now.saturating_sub(minutes.saturating_mul(NANOS_PER_MINUTE))
}
