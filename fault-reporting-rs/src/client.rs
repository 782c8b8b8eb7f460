//! # Collaborator Seams
//!
//! Traits for the two collaborators the listener drives: the error-tracking
//! client that accepts finished reports, and the runtime register holding the
//! process memory limit.

use std::sync::atomic::{AtomicU64, Ordering};
use crate::config::Configuration;
use crate::report::Report;
use crate::types::Result;

/// The error-tracking client.
///
/// Delivery, batching and retries belong to the implementation; the listener
/// only decides what to submit and when to flush.
#[cfg_attr(test, mockall::automock)]
pub trait TrackingClient: Send + Sync {
    /// Sets the classification applied to reports that carry none
    fn set_fallback_classification(&self, classification: &str);

    /// Bytes added to the memory limit after an out-of-memory fault
    fn memory_limit_increase(&self) -> Option<u64>;

    /// Accepts a finished report
    fn submit(&self, report: Report) -> Result<()>;

    /// Delivers all buffered reports now
    fn flush(&self) -> Result<()>;

    /// Current configuration
    fn configuration(&self) -> Configuration;
}

/// The process memory limit register
#[cfg_attr(test, mockall::automock)]
pub trait MemoryLimiter: Send + Sync {
    /// Sets the memory limit in bytes
    fn set_memory_limit(&self, bytes: u64) -> Result<()>;

    /// Current memory limit in bytes, `None` when unlimited
    fn memory_limit(&self) -> Option<u64>;
}

/// Memory limit register shared by the workers of one process
#[derive(Debug, Default)]
pub struct ProcessMemoryLimit {
    // 0 means unlimited
    bytes: AtomicU64,
}

impl ProcessMemoryLimit {
    /// Creates a register holding the given limit
    pub fn new(bytes: u64) -> Self {
        Self {
            bytes: AtomicU64::new(bytes),
        }
    }

    /// Creates a register with no limit
    pub fn unlimited() -> Self {
        Self::default()
    }
}

impl MemoryLimiter for ProcessMemoryLimit {
    fn set_memory_limit(&self, bytes: u64) -> Result<()> {
        self.bytes.store(bytes, Ordering::SeqCst);
        Ok(())
    }

    fn memory_limit(&self) -> Option<u64> {
        match self.bytes.load(Ordering::SeqCst) {
            0 => None,
            bytes => Some(bytes),
        }
    }
}
