//! Wall-clock source
//!
//! Expiry timestamps throughout the workspace are unix milliseconds. Code that
//! compares against "now" takes a `Clock` so TTL behavior can be driven
//! deterministically in tests with `ManualClock`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Source of the current time as unix milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;

    /// Current time in whole unix seconds (JWT `iat`/`exp` granularity).
    fn now_secs(&self) -> u64 {
        self.now_millis() / 1000
    }
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
