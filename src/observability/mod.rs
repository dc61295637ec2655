//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges through the `metrics` facade)
//!
//! Consumers:
//!     → stderr (fmt layer, filtered by RUST_LOG or the Debug flag)
//!     → Prometheus scrape endpoint (binary only, `--metrics <addr>`)
//! ```
//!
//! # Design Decisions
//! - Library code only emits; installing subscribers and exporters is the
//!   binary's job
//! - Metric updates are atomic increments; with no recorder installed they
//!   are no-ops

pub mod logging;
pub mod metrics;
