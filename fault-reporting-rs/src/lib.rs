//! # Fault Reporting
//!
//! Observes faults raised inside a host application's request, command and
//! job lifecycle and turns them into reports for an error-tracking service,
//! without disturbing the host's own fault handling.
//!
//! ## Features
//!
//! - Capability-probed subscription table with explicit priorities
//! - Canonicalization of legacy and current host signal shapes
//! - Unhandled-fault reports enriched with command, job and request metadata
//! - Memory limit remediation after out-of-memory faults
//! - Flush scheduling for long-running job workers
//! - Request-scoped context so one listener can serve concurrent workers
//!

pub mod types;
pub mod config;
pub mod logging;
pub mod fault;
pub mod signal;
pub mod context;
pub mod sanitization;
pub mod report;
pub mod remediation;
pub mod subscriptions;
pub mod client;
pub mod reporting;
pub mod listener;

#[cfg(test)]
mod tests;

use std::sync::Arc;

// Re-export commonly used types
pub use types::{Error, Result, Severity};
pub use config::Configuration;
pub use fault::{Fault, FaultKind};
pub use signal::{CommandFailure, CommandFault, FaultSignal, JobFailure, RequestFault, RetryDecision};
pub use context::RequestContext;
pub use report::{Metadata, Report, SeverityReason};
pub use remediation::{Remediation, SkipReason};
pub use subscriptions::{Handler, HostCapabilities, SignalKind, Subscription, SubscriptionTable};
pub use client::{MemoryLimiter, ProcessMemoryLimit, TrackingClient};
pub use reporting::{BufferedClient, LogTransport, MemoryTransport, Transport};
pub use listener::FaultListener;
pub use logging::{init_logging, LoggingConfig};

/// Initializes logging and builds a listener backed by a [`BufferedClient`]
/// that logs delivered reports.
///
/// Settings are read once from `config_path` (if given) and the environment;
/// `logging.*` keys configure the subscriber, the rest the listener.
pub fn init(
    config_path: Option<&str>,
    capabilities: &HostCapabilities,
    limiter: Arc<dyn MemoryLimiter>,
) -> Result<FaultListener> {
    let sources = crate::config::load_sources(config_path)?;
    init_logging(Some(LoggingConfig::try_from(sources.clone())?))?;

    let configuration = Configuration::from_sources(sources)?;
    let client = Arc::new(BufferedClient::new(configuration, Arc::new(LogTransport)));
    let listener = FaultListener::new(client, limiter, capabilities);

    tracing::info!(
        subscriptions = listener.subscriptions().len(),
        "Fault listener initialized"
    );

    Ok(listener)
}
