//! # Error Types
//!
//! Errors raised by the fault listener and its collaborators.
//!
//! Only [`Error::IntegrationMismatch`] is ever allowed to escape a listener
//! handler. Every other variant is produced by collaborators (tracking client,
//! transport, memory limiter) and is logged and swallowed by the listener so
//! that reporting never interferes with the host's own fault handling.

use std::fmt;
use serde::{Serialize, Deserialize};

/// A type alias for Result with the error type defaulting to our Error
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while capturing and reporting faults
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A host signal arrived in a shape the listener does not understand
    #[error("Integration mismatch: {0}")]
    IntegrationMismatch(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The tracking client refused a report
    #[error("Report submission failed: {0}")]
    Submission(String),

    /// Buffered reports could not be handed to the transport
    #[error("Flush failed: {0}")]
    Flush(String),

    /// The runtime memory limit could not be changed
    #[error("Memory limit error: {0}")]
    MemoryLimit(String),

    /// Logging or reporting infrastructure failed to start
    #[error("Initialization error: {0}")]
    Initialization(String),
}

impl Error {
    /// Create an integration mismatch error
    pub fn integration_mismatch(message: impl Into<String>) -> Self {
        Error::IntegrationMismatch(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Create a submission error
    pub fn submission(message: impl Into<String>) -> Self {
        Error::Submission(message.into())
    }

    /// Create a flush error
    pub fn flush(message: impl Into<String>) -> Self {
        Error::Flush(message.into())
    }

    /// Create a memory limit error
    pub fn memory_limit(message: impl Into<String>) -> Self {
        Error::MemoryLimit(message.into())
    }

    /// Create an initialization error
    pub fn initialization(message: impl Into<String>) -> Self {
        Error::Initialization(message.into())
    }

    /// Returns true if this error must be propagated to the host
    pub fn is_integration_mismatch(&self) -> bool {
        matches!(self, Error::IntegrationMismatch(_))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Configuration(err.to_string())
    }
}

/// Severity attached to a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A fault the host recovered from
    Warning,
    /// A fault the host did not recover from
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Error
    }
}
