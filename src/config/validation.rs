//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic checks on options read from disk (serde handles syntax)
//! - Reject half-specified TLS material instead of silently serving plaintext
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: `&Options -> Result<(), Vec<ValidationError>>`
//! - Programmatic options skip this step; only the loader enforces it

use std::fmt;

use crate::config::schema::Options;

/// A single semantic problem with a set of options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Only one of certificate or key was given.
    PartialTls {
        /// Name of the half that is missing.
        missing: &'static str,
    },
    /// Host contains characters that cannot appear in a bind address.
    InvalidHost(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::PartialTls { missing } => {
                write!(f, "tls: {} is missing, both certificate and key are required", missing)
            }
            ValidationError::InvalidHost(host) => write!(f, "host: {:?} is not a valid bind host", host),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate options, collecting every problem found.
pub fn validate_options(options: &Options) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if options.tls.is_partial() {
        let missing = if options.tls.certificate.is_empty() {
            "certificate"
        } else {
            "key"
        };
        errors.push(ValidationError::PartialTls { missing });
    }

    if options.host.chars().any(|c| c.is_whitespace() || c == '/') {
        errors.push(ValidationError::InvalidHost(options.host.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
