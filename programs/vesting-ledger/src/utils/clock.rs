use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Source of "now" in Unix milliseconds.
pub trait TimeSource: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Settable clock for deterministic callers and tests.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now_ms: AtomicI64,
}

impl ManualTimeSource {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_millis(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
