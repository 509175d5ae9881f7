//! Injected time source.
//!
//! Enforcement expiry and the failed-login windows depend on "now" rather
//! than on an event timestamp, so the engine takes its clock as a dependency
//! instead of calling into the system directly.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Supplies the current unix timestamp in seconds.
pub trait Clock: Send + Sync {
    fn now_ts(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ts(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// A clock that only moves when told to. Shared via `Arc`, so a handle kept
/// by the test can advance time under the engine.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        ManualClock {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn set(&self, ts: i64) {
        self.now.store(ts, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ts(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
