//! # Fault Listener
//!
//! Receives lifecycle signals from the host, turns faults into reports and
//! decides when buffered reports are flushed.
//!
//! The listener holds no per-request state of its own: the current request
//! lives in the thread-local scope of [`crate::context`], so one listener can
//! be shared across concurrent workers. Job signals start a fresh unit of
//! work, so they clear that scope before reporting.
//!
//! Only [`crate::Error::IntegrationMismatch`] leaves a handler. Submission and flush
//! failures are logged and dropped, because the listener runs inside the
//! host's own fault path and must not disturb it.

use std::sync::Arc;
use metrics::counter;
use tracing::{debug, warn};
use crate::client::{MemoryLimiter, TrackingClient};
use crate::context::{self, RequestContext};
use crate::fault::Fault;
use crate::remediation::{self, Remediation};
use crate::report::{Metadata, Report};
use crate::sanitization::redact_request;
use crate::signal::{CommandFailure, CommandFault, FaultSignal, JobFailure, RequestFault};
use crate::subscriptions::{HostCapabilities, SubscriptionTable};
use crate::types::Result;

/// Metadata group for command faults
pub const COMMAND_GROUP: &str = "command";

/// Metadata group for job failures
pub const MESSENGER_GROUP: &str = "Messenger";

/// Dispatches host lifecycle signals to report building and flushing
pub struct FaultListener {
    client: Arc<dyn TrackingClient>,
    limiter: Arc<dyn MemoryLimiter>,
    subscriptions: SubscriptionTable,
}

impl FaultListener {
    /// Creates a listener for a host with the given capabilities
    pub fn new(
        client: Arc<dyn TrackingClient>,
        limiter: Arc<dyn MemoryLimiter>,
        capabilities: &HostCapabilities,
    ) -> Self {
        Self {
            client,
            limiter,
            subscriptions: SubscriptionTable::build(capabilities),
        }
    }

    /// The registration table handed to the host
    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    /// Routes a signal to its handler.
    ///
    /// Signals of a kind the listener did not subscribe to are ignored.
    pub fn dispatch(&self, signal: FaultSignal) -> Result<()> {
        let kind = signal.kind();
        if !self.subscriptions.contains(kind) {
            debug!(signal = %kind, "Ignoring signal outside the subscription table");
            return Ok(());
        }
        debug!(signal = %kind, "Dispatching lifecycle signal");

        match signal {
            FaultSignal::RequestReceived { request, is_primary } => {
                self.on_request_received(request, is_primary);
                Ok(())
            }
            FaultSignal::RequestFaulted(fault) => self.on_request_faulted(fault),
            FaultSignal::CommandFaulted(fault) => {
                self.on_command_faulted(fault);
                Ok(())
            }
            FaultSignal::JobFailed(failure) => {
                self.on_job_failed(failure);
                Ok(())
            }
            FaultSignal::JobHandled => {
                self.on_job_handled();
                Ok(())
            }
        }
    }

    /// Registers the inbound request. Sub-requests are ignored.
    pub fn on_request_received(&self, request: RequestContext, is_primary: bool) {
        if !is_primary {
            return;
        }
        let classification = self.client.configuration().fallback_classification;
        self.client.set_fallback_classification(&classification);
        context::set_request_context(request);
    }

    /// Reports a request fault, raising the memory limit first when the fault
    /// is an out-of-memory condition
    pub fn on_request_faulted(&self, signal: RequestFault) -> Result<()> {
        let fault = signal.into_fault().map_err(|e| {
            counter!("fault_reports.integration_mismatch", 1);
            warn!(error = %e, "Request fault signal has an unexpected shape");
            e
        })?;

        if fault.is_out_of_memory() {
            let outcome = remediation::remediate(&fault, self.client.memory_limit_increase(), self.limiter.as_ref());
            if let Remediation::Skipped(reason) = outcome {
                debug!(?reason, "Memory limit left unchanged");
            }
        }

        self.notify(fault, Metadata::new());
        Ok(())
    }

    /// Reports a command fault with its exit status and command name
    pub fn on_command_faulted(&self, signal: CommandFault) {
        let failure = CommandFailure::from(signal);

        let mut command = serde_json::Map::new();
        command.insert("status".to_string(), serde_json::Value::from(failure.exit_code));
        if let Some(name) = failure.command {
            command.insert("name".to_string(), serde_json::Value::String(name));
        }

        let mut metadata = Metadata::new();
        metadata.insert(COMMAND_GROUP.to_string(), command);

        self.notify(failure.fault, metadata);
    }

    /// Reports a job failure, then flushes.
    ///
    /// The retry intent carried by `failure` must already reflect the host's
    /// retry decision. A request left in the thread's scope by earlier work
    /// is not attached.
    pub fn on_job_failed(&self, failure: JobFailure) {
        context::clear_request_scope();

        let mut messenger = serde_json::Map::new();
        messenger.insert("willRetry".to_string(), serde_json::Value::Bool(failure.retry.will_retry()));
        if let Some(job) = failure.job {
            messenger.insert("job".to_string(), serde_json::Value::String(job));
        }

        let mut metadata = Metadata::new();
        metadata.insert(MESSENGER_GROUP.to_string(), messenger);

        self.notify(failure.fault, metadata);
        self.flush();
    }

    /// Flushes after a job; long-running workers never reach a shutdown flush
    pub fn on_job_handled(&self) {
        context::clear_request_scope();
        self.flush();
    }

    /// Builds and submits an unhandled report unless notification is disabled
    fn notify(&self, fault: Fault, metadata: Metadata) {
        let config = self.client.configuration();
        if !config.auto_notify {
            counter!("fault_reports.suppressed", 1);
            debug!(fault = %fault, "Notification disabled, report suppressed");
            return;
        }

        let mut report = Report::unhandled(fault, &config);
        report.merge_metadata(metadata);
        if let Some(request) = context::current_request_context() {
            report = report.with_request(redact_request(&request, &config.redacted_keys));
        }

        let summary = report.to_string();
        match self.client.submit(report) {
            Ok(()) => {
                counter!("fault_reports.submitted", 1);
                debug!(report = %summary, "Report submitted");
            }
            Err(e) => warn!(report = %summary, error = %e, "Failed to submit report"),
        }
    }

    fn flush(&self) {
        counter!("fault_reports.flushes", 1);
        if let Err(e) = self.client.flush() {
            warn!(error = %e, "Failed to flush buffered reports");
        }
    }
}

impl std::fmt::Debug for FaultListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultListener")
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}
