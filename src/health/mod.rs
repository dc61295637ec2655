//! Node health subsystem.
//!
//! # Data Flow
//! ```text
//! Dial through a node fails
//!     → state.rs (FailMarker::mark: count + timestamp)
//!
//! Selector query
//!     → passive.rs (FailFilter drops nodes over max_fails
//!                   until fail_timeout elapses;
//!                   InvalidFilter drops undialable addresses)
//!     → load_balancer strategy picks from the survivors
//!
//! Dial succeeds
//!     → state.rs (FailMarker::reset)
//! ```
//!
//! # Design Decisions
//! - Health is passive only; there is no probing
//! - Health state is per-node, not per-group

pub mod passive;
pub mod state;

pub use passive::{FailFilter, Filter, InvalidFilter};
pub use state::FailMarker;
