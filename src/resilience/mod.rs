//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Accept loop error → backoff.rs (5ms doubling to 1s, jittered) → retry accept
//! Outbound dial     → timeouts.rs (deadline per dial/handshake)
//! ```
//!
//! # Design Decisions
//! - Every outbound dial has a deadline; zero means the default
//! - Backoff resets on the first successful accept

pub mod backoff;
pub mod timeouts;
