//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Vec<Router> → one serve task per router → RunningRouters
//!
//! Shutdown (startup.rs, shutdown.rs):
//!     signal received → close every listener → await serve tasks
//!     → drain in-flight connections (bounded)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → return from wait_for_shutdown
//! ```
//!
//! # Design Decisions
//! - No global cancellation token; each owner closes what it owns
//! - Stop signals are sticky, so late waiters never miss a trigger
//! - Shutdown has a deadline for draining connections

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Signal, SignalListener};
pub use signals::wait_for_shutdown;
pub use startup::{serve_all, RunningRouters, DRAIN_TIMEOUT};
