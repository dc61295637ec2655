//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject configurations that would start no listener
//! - Reject empty node specs and negative retry budgets
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BaseConfig → Result<(), Vec<ValidationError>>
//! - Node specs themselves are parsed by the builders, not here

use crate::config::schema::BaseConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// No route has a serve node.
    NoServeNodes,
    /// A node spec string is empty.
    EmptyNodeSpec { route: usize, field: &'static str },
    /// A route's retry budget is negative.
    NegativeRetries { route: usize, retries: i64 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::NoServeNodes => write!(f, "no serve nodes configured"),
            ValidationError::EmptyNodeSpec { route, field } => {
                write!(f, "route {}: empty entry in {}", route, field)
            }
            ValidationError::NegativeRetries { route, retries } => {
                write!(f, "route {}: negative retries {}", route, retries)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check a configuration. Route 0 is the top-level route.
pub fn validate_config(config: &BaseConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let routes = std::iter::once(&config.route).chain(config.routes.iter());
    for (i, route) in routes.enumerate() {
        if route.serve_nodes.iter().any(|s| s.trim().is_empty()) {
            errors.push(ValidationError::EmptyNodeSpec { route: i, field: "ServeNodes" });
        }
        if route.chain_nodes.iter().any(|s| s.trim().is_empty()) {
            errors.push(ValidationError::EmptyNodeSpec { route: i, field: "ChainNodes" });
        }
        if route.retries < 0 {
            errors.push(ValidationError::NegativeRetries { route: i, retries: route.retries });
        }
    }

    if config.routes().next().is_none() {
        errors.push(ValidationError::NoServeNodes);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
