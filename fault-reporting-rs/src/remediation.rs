//! # Out-of-Memory Remediation
//!
//! After an out-of-memory fault the process memory limit is raised so the
//! next unit of work has more headroom. The faulted request is not retried.
//! Every path that does not raise the limit is a silent no-op, never an error.

use once_cell::sync::Lazy;
use regex::Regex;
use metrics::counter;
use crate::client::MemoryLimiter;
use crate::fault::Fault;

static EXHAUSTED_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Allowed memory size of (\d+) bytes exhausted \(tried to allocate \d+ bytes\)").unwrap()
});

/// Why remediation did not change the memory limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The fault is not an out-of-memory condition
    NotOutOfMemory,
    /// No memory limit increase is configured
    NotConfigured,
    /// The fault message does not state the exhausted limit
    UnrecognizedMessage,
    /// The runtime refused the new limit
    LimiterFailed(String),
}

/// Outcome of a remediation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remediation {
    /// The memory limit was raised
    Applied {
        /// Limit reported as exhausted by the fault
        exhausted: u64,
        /// Limit now in effect
        new_limit: u64,
    },
    /// The memory limit was left alone
    Skipped(SkipReason),
}

impl Remediation {
    /// Returns true if the limit was raised
    pub fn is_applied(&self) -> bool {
        matches!(self, Remediation::Applied { .. })
    }
}

/// Extracts the exhausted limit from an out-of-memory message
pub fn parse_exhausted_limit(message: &str) -> Option<u64> {
    EXHAUSTED_PATTERN
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|limit| limit.as_str().parse::<u64>().ok())
}

/// Raises the memory limit to `exhausted + increase` when the fault is an
/// out-of-memory condition with a recognizable message
pub fn remediate(fault: &Fault, increase: Option<u64>, limiter: &dyn MemoryLimiter) -> Remediation {
    if !fault.is_out_of_memory() {
        return Remediation::Skipped(SkipReason::NotOutOfMemory);
    }

    let increase = match increase {
        Some(increase) => increase,
        None => {
            tracing::debug!("Out-of-memory fault seen but no memory limit increase is configured");
            return Remediation::Skipped(SkipReason::NotConfigured);
        }
    };

    let exhausted = match parse_exhausted_limit(&fault.message) {
        Some(limit) => limit,
        None => {
            tracing::debug!(message = %fault.message, "Out-of-memory message does not state the exhausted limit");
            return Remediation::Skipped(SkipReason::UnrecognizedMessage);
        }
    };

    let new_limit = exhausted.saturating_add(increase);
    match limiter.set_memory_limit(new_limit) {
        Ok(()) => {
            counter!("fault_reports.memory_limit_raised", 1);
            tracing::info!(exhausted, new_limit, "Raised memory limit after out-of-memory fault");
            Remediation::Applied { exhausted, new_limit }
        }
        Err(e) => {
            tracing::warn!(new_limit, error = %e, "Failed to raise memory limit");
            Remediation::Skipped(SkipReason::LimiterFailed(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ProcessMemoryLimit;

    const OOM_MESSAGE: &str = "Allowed memory size of 134217728 bytes exhausted (tried to allocate 20480 bytes)";

    #[test]
    fn test_parse_exhausted_limit() {
        assert_eq!(parse_exhausted_limit(OOM_MESSAGE), Some(134_217_728));
        assert_eq!(
            parse_exhausted_limit("PHP Fatal error: Allowed memory size of 1024 bytes exhausted (tried to allocate 8 bytes) in worker.php"),
            Some(1024)
        );
        assert_eq!(parse_exhausted_limit("Out of memory"), None);
        assert_eq!(parse_exhausted_limit("Allowed memory size of lots bytes exhausted"), None);
    }

    #[test]
    fn test_raises_limit() {
        let limiter = ProcessMemoryLimit::new(134_217_728);
        let outcome = remediate(&Fault::out_of_memory(OOM_MESSAGE), Some(67_108_864), &limiter);

        assert_eq!(
            outcome,
            Remediation::Applied {
                exhausted: 134_217_728,
                new_limit: 201_326_592,
            }
        );
        assert_eq!(limiter.memory_limit(), Some(201_326_592));
    }

    #[test]
    fn test_legacy_kind_is_recognized() {
        let limiter = ProcessMemoryLimit::new(134_217_728);
        let outcome = remediate(&Fault::legacy_out_of_memory(OOM_MESSAGE), Some(1), &limiter);
        assert!(outcome.is_applied());
        assert_eq!(limiter.memory_limit(), Some(134_217_729));
    }

    #[test]
    fn test_skips_without_increase() {
        let limiter = ProcessMemoryLimit::new(134_217_728);
        let outcome = remediate(&Fault::out_of_memory(OOM_MESSAGE), None, &limiter);

        assert_eq!(outcome, Remediation::Skipped(SkipReason::NotConfigured));
        assert_eq!(limiter.memory_limit(), Some(134_217_728));
    }

    #[test]
    fn test_skips_other_faults_and_messages() {
        let limiter = ProcessMemoryLimit::unlimited();

        let outcome = remediate(&Fault::new("RuntimeException", OOM_MESSAGE), Some(1024), &limiter);
        assert_eq!(outcome, Remediation::Skipped(SkipReason::NotOutOfMemory));

        let outcome = remediate(&Fault::out_of_memory("Out of memory"), Some(1024), &limiter);
        assert_eq!(outcome, Remediation::Skipped(SkipReason::UnrecognizedMessage));

        assert_eq!(limiter.memory_limit(), None);
    }
}
