//! # Fault Signals
//!
//! Lifecycle signals raised by the host and consumed by the fault listener.
//!
//! Hosts have shipped more than one shape for the same concept (the request
//! fault event, the console fault event). Those shapes are modelled as
//! variants here and resolved once, at the boundary, into the canonical
//! [`Fault`] and [`CommandFailure`] values the listener works with.

use serde::{Serialize, Deserialize};
use crate::context::RequestContext;
use crate::fault::Fault;
use crate::subscriptions::SignalKind;
use crate::types::{Error, Result};

/// A signal raised by the host lifecycle framework
#[derive(Debug, Clone)]
pub enum FaultSignal {
    /// A request entered the host
    RequestReceived {
        /// Context of the inbound request
        request: RequestContext,
        /// False for sub-requests such as internal forwards
        is_primary: bool,
    },
    /// Request handling raised a fault
    RequestFaulted(RequestFault),
    /// A CLI command raised a fault
    CommandFaulted(CommandFault),
    /// An asynchronous job failed
    JobFailed(JobFailure),
    /// An asynchronous job finished without a fault
    JobHandled,
}

impl FaultSignal {
    /// The subscription kind this signal is delivered under
    pub fn kind(&self) -> SignalKind {
        match self {
            FaultSignal::RequestReceived { .. } => SignalKind::RequestReceived,
            FaultSignal::RequestFaulted(_) => SignalKind::RequestFaulted,
            FaultSignal::CommandFaulted(CommandFault::Exception { .. }) => SignalKind::ConsoleException,
            FaultSignal::CommandFaulted(CommandFault::Error { .. }) => SignalKind::ConsoleError,
            FaultSignal::JobFailed(_) => SignalKind::JobFailed,
            FaultSignal::JobHandled => SignalKind::JobHandled,
        }
    }
}

/// The historical shapes of the request fault event
#[derive(Debug, Clone)]
pub enum RequestFault {
    /// Older shape exposing the fault through an `exception` accessor
    Exception {
        /// The fault raised by the request handler
        exception: Fault,
    },
    /// Current shape exposing the fault through a `throwable` accessor
    Throwable {
        /// The fault raised by the request handler
        throwable: Fault,
    },
    /// Any other event delivered on the request fault channel
    Unrecognized {
        /// Host-side type name of the event
        event: String,
    },
}

impl RequestFault {
    /// Resolves the event into its underlying fault
    pub fn into_fault(self) -> Result<Fault> {
        match self {
            RequestFault::Exception { exception } => Ok(exception),
            RequestFault::Throwable { throwable } => Ok(throwable),
            RequestFault::Unrecognized { event } => Err(Error::integration_mismatch(format!(
                "expected a request fault event exposing an exception or throwable, got '{}'",
                event
            ))),
        }
    }
}

/// The legacy and current shapes of the console fault event
#[derive(Debug, Clone)]
pub enum CommandFault {
    /// Legacy console exception event
    Exception {
        /// The fault raised by the command
        exception: Fault,
        /// Process exit code the host will use
        exit_code: i32,
        /// Command name, if the command could be resolved
        command: Option<String>,
    },
    /// Replacement console error event
    Error {
        /// The fault raised by the command
        error: Fault,
        /// Process exit code the host will use
        exit_code: i32,
        /// Command name, if the command could be resolved
        command: Option<String>,
    },
}

/// Canonical form of a command fault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    /// The fault raised by the command
    pub fault: Fault,
    /// Process exit code
    pub exit_code: i32,
    /// Command name, if identifiable
    pub command: Option<String>,
}

impl From<CommandFault> for CommandFailure {
    fn from(signal: CommandFault) -> Self {
        match signal {
            CommandFault::Exception { exception, exit_code, command } => Self {
                fault: exception,
                exit_code,
                command,
            },
            CommandFault::Error { error, exit_code, command } => Self {
                fault: error,
                exit_code,
                command,
            },
        }
    }
}

/// Whether the host will retry a failed job.
///
/// Must be decided by the host's retry policy before the job failure is
/// delivered to the fault listener; the subscription table orders the
/// listener after the retry decision for this reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryDecision {
    /// The job will be redelivered
    WillRetry,
    /// The job has failed for good
    Final,
}

impl RetryDecision {
    /// Returns true if the job will be retried
    pub fn will_retry(self) -> bool {
        matches!(self, RetryDecision::WillRetry)
    }
}

impl From<bool> for RetryDecision {
    fn from(will_retry: bool) -> Self {
        if will_retry {
            RetryDecision::WillRetry
        } else {
            RetryDecision::Final
        }
    }
}

/// A failed asynchronous job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    /// The fault raised by the job handler
    pub fault: Fault,
    /// Retry intent decided by the host
    pub retry: RetryDecision,
    /// Job identity, when the host exposes one
    pub job: Option<String>,
}

impl JobFailure {
    /// Creates a job failure with a decided retry intent
    pub fn new(fault: Fault, retry: impl Into<RetryDecision>) -> Self {
        Self {
            fault,
            retry: retry.into(),
            job: None,
        }
    }

    /// Sets the job identity
    pub fn job<S: Into<String>>(mut self, job: S) -> Self {
        self.job = Some(job.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_fault_shapes_resolve() {
        let legacy = RequestFault::Exception {
            exception: Fault::new("LogicException", "legacy"),
        };
        let current = RequestFault::Throwable {
            throwable: Fault::new("LogicException", "current"),
        };

        assert_eq!(legacy.into_fault().unwrap().message, "legacy");
        assert_eq!(current.into_fault().unwrap().message, "current");
    }

    #[test]
    fn test_unrecognized_request_fault_is_mismatch() {
        let signal = RequestFault::Unrecognized {
            event: "TerminateEvent".to_string(),
        };
        let err = signal.into_fault().unwrap_err();
        assert!(err.is_integration_mismatch());
        assert!(err.to_string().contains("TerminateEvent"));
    }

    #[test]
    fn test_command_fault_shapes_canonicalize() {
        let legacy = CommandFailure::from(CommandFault::Exception {
            exception: Fault::new("RuntimeException", "boom"),
            exit_code: 2,
            command: Some("cache:clear".to_string()),
        });
        let current = CommandFailure::from(CommandFault::Error {
            error: Fault::new("RuntimeException", "boom"),
            exit_code: 2,
            command: Some("cache:clear".to_string()),
        });
        assert_eq!(legacy, current);
    }

    #[test]
    fn test_signal_kinds() {
        let legacy = FaultSignal::CommandFaulted(CommandFault::Exception {
            exception: Fault::new("RuntimeException", "boom"),
            exit_code: 1,
            command: None,
        });
        assert_eq!(legacy.kind(), SignalKind::ConsoleException);
        assert_eq!(FaultSignal::JobHandled.kind(), SignalKind::JobHandled);
        assert!(RetryDecision::from(true).will_retry());
        assert!(!RetryDecision::from(false).will_retry());
    }
}
