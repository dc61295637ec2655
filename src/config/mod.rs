//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (JSON/TOML) + CLI node flags
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BaseConfig (validated, immutable)
//!     → routing::builder builds routers from it
//!
//! Node options naming auxiliary data:
//!     → source.rs (path first, inline second)
//!     → users.rs / ip.rs (and the security, routing, dns loaders)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only auxiliary files reload live
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod ip;
pub mod loader;
pub mod schema;
pub mod source;
pub mod users;
pub mod validation;

pub use loader::{load_config, read_config, ConfigError};
pub use schema::{BaseConfig, RouteConfig};
pub use source::{LoaderError, Source};
pub use validation::{validate_config, ValidationError};
