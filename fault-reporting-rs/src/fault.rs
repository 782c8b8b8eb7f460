//! # Fault Values
//!
//! The underlying error value carried by a host fault signal.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Classification of a fault value.
///
/// Hosts have named the out-of-memory condition differently across versions;
/// both names are recognized so the remediation heuristic works on either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Dedicated out-of-memory error kind
    OutOfMemoryError,
    /// Out-of-memory exception kind raised by older hosts
    OutOfMemoryException,
    /// Any other fault
    Other,
}

impl FaultKind {
    /// Returns true for either out-of-memory kind
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, FaultKind::OutOfMemoryError | FaultKind::OutOfMemoryException)
    }
}

impl Default for FaultKind {
    fn default() -> Self {
        FaultKind::Other
    }
}

/// Class recorded for chained sources of a converted error
pub const SOURCE_CLASS: &str = "Error";

/// A fault raised inside the host lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Host-side type name of the error value
    pub class: String,
    /// Error message
    pub message: String,
    /// Fault classification
    pub kind: FaultKind,
    /// Chain of previous faults, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous: Vec<Fault>,
}

impl Fault {
    /// Creates a new fault with the given class name and message
    pub fn new<C: Into<String>, M: Into<String>>(class: C, message: M) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            kind: FaultKind::Other,
            previous: Vec::new(),
        }
    }

    /// Creates an out-of-memory fault of the current error kind
    pub fn out_of_memory<M: Into<String>>(message: M) -> Self {
        Self::new("OutOfMemoryError", message).kind(FaultKind::OutOfMemoryError)
    }

    /// Creates an out-of-memory fault of the legacy exception kind
    pub fn legacy_out_of_memory<M: Into<String>>(message: M) -> Self {
        Self::new("OutOfMemoryException", message).kind(FaultKind::OutOfMemoryException)
    }

    /// Converts a standard error into a fault, keeping its source chain.
    ///
    /// The class is the error's type name. Sources are only known as
    /// `dyn Error`, so they are recorded under [`SOURCE_CLASS`].
    pub fn from_error<E: std::error::Error + 'static>(error: &E) -> Self {
        let mut fault = Self::new(std::any::type_name::<E>(), error.to_string());
        let mut source = error.source();
        while let Some(cause) = source {
            fault.previous.push(Self::new(SOURCE_CLASS, cause.to_string()));
            source = cause.source();
        }
        fault
    }

    /// Sets the fault classification
    pub fn kind(mut self, kind: FaultKind) -> Self {
        self.kind = kind;
        self
    }

    /// Appends a previous fault to the chain
    pub fn caused_by(mut self, previous: Fault) -> Self {
        self.previous.push(previous);
        self
    }

    /// Returns true if this fault is an out-of-memory condition
    pub fn is_out_of_memory(&self) -> bool {
        self.kind.is_out_of_memory()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}
