//! Live reloading of file-backed state.
//!
//! # Data Flow
//! ```text
//! loader opens file → builds reloadable → initial reload(contents)
//!     → supervisor::spawn(weak ref, path)
//!
//! every max(period, floor):
//!     stat(path) → mtime advanced (or first tick)?
//!         → read(path) → reloadable.reload(contents)
//!         → error: log, keep previous contents
//!     stopped or dropped → task exits
//! ```
//!
//! # Design Decisions
//! - One task per reloadable, holding only a weak reference
//! - Reload builds new contents off to the side and swaps them in
//! - No lock is held across file I/O

pub mod supervisor;

use std::io::BufRead;
use std::time::Duration;

use crate::lifecycle::Signal;

pub use supervisor::{period_reload, spawn, RELOAD_FLOOR};

/// Error returned by a failed reload.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Parse(String),
}

/// File-watched mutable state.
pub trait Reloadable: Send + Sync {
    /// Replace the current contents with the ones read from `reader`.
    fn reload(&self, reader: &mut dyn BufRead) -> Result<(), ReloadError>;

    /// Reload period. `None` means reloading is disabled for good (the
    /// reloadable was stopped); `Some(Duration::ZERO)` means no period is
    /// configured and the supervisor idles.
    fn period(&self) -> Option<Duration>;

    /// The signal that stops reloading.
    fn stop_signal(&self) -> &Signal;

    /// Stop reloading.
    fn stop(&self) {
        self.stop_signal().trigger();
    }

    /// Check whether reloading was stopped.
    fn stopped(&self) -> bool {
        self.stop_signal().is_triggered()
    }
}

/// Split a config line into whitespace separated fields, dropping `#` comments.
pub(crate) fn split_line(line: &str) -> Vec<&str> {
    let line = match line.find('#') {
        Some(n) => &line[..n],
        None => line,
    };
    line.split_whitespace().collect()
}
