//! services/journal_api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;
use mood_journal_core::{IdentityError, InsightError, PortError};

/// The primary error type for the `journal_api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// An identity provider failure outside of the session monitor.
    #[error("Identity Error: {0}")]
    Identity(#[from] IdentityError),

    /// An insight request that could not be satisfied.
    #[error("Insight Error: {0}")]
    Insight(#[from] InsightError),

    /// Represents an error from the HTTP client used by the identity and probe adapters.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
