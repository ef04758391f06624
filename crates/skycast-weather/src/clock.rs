//! Wall-clock source for cache timestamps.

use std::sync::atomic::{AtomicI64, Ordering};

pub const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Supplies the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for tests and replay.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn new(now_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(now_millis),
        }
    }

    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A record is fresh when it was fetched in the same wall-clock hour as `now`.
///
/// This is a bucket comparison, not a rolling window: 10:59:59 is stale at
/// 11:00:00.
pub fn is_fresh(fetched_at: i64, now: i64) -> bool {
    fetched_at.div_euclid(MILLIS_PER_HOUR) == now.div_euclid(MILLIS_PER_HOUR)
}
