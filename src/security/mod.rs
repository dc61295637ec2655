//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound connection:
//!     → auth.rs (credentials checked by the protocol handler
//!                against the route's authenticator)
//!     → access_control.rs (destination checked against the
//!                          whitelist, then the blacklist)
//!     → Pass to the chain
//! ```
//!
//! # Design Decisions
//! - Fail closed: a destination outside the whitelist is refused
//! - Authenticator tables reload live; permissions are fixed per build

pub mod access_control;
pub mod auth;

pub use access_control::{parse_permissions, permitted, PermissionError, Permissions};
pub use auth::{parse_authenticator, Authenticator, LocalAuthenticator};
