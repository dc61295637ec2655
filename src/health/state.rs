//! Per-node failure bookkeeping.
//!
//! # State
//! ```text
//! fail_count: consecutive failures since the last reset
//! fail_time:  when the latest failure was marked (0 = never)
//! ```
//!
//! # Design Decisions
//! - Lock-free counters, marked from the forwarding path
//! - Copies are independent; marking one never affects another

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Default)]
pub struct FailMarker {
    fail_count: AtomicU32,
    /// Milliseconds since the Unix epoch.
    fail_time: AtomicU64,
}

impl FailMarker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure now.
    pub fn mark(&self) {
        self.fail_count.fetch_add(1, Ordering::Relaxed);
        self.fail_time.store(now_millis(), Ordering::Relaxed);
    }

    /// Clear the failure history after a success.
    pub fn reset(&self) {
        self.fail_count.store(0, Ordering::Relaxed);
        self.fail_time.store(0, Ordering::Relaxed);
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count.load(Ordering::Relaxed)
    }

    /// Time of the latest failure, if any.
    pub fn fail_time(&self) -> Option<SystemTime> {
        match self.fail_time.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms)),
        }
    }

    /// Independent copy of the current state.
    pub fn snapshot(&self) -> Self {
        Self {
            fail_count: AtomicU32::new(self.fail_count()),
            fail_time: AtomicU64::new(self.fail_time.load(Ordering::Relaxed)),
        }
    }

    #[cfg(test)]
    pub(crate) fn set_fail_time(&self, at: SystemTime) {
        let ms = at.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
        self.fail_time.store(ms, Ordering::Relaxed);
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .max(1) as u64
}
