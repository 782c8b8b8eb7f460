//! # Signal Subscriptions
//!
//! Which host signals the fault listener receives, and at what priority.
//!
//! The host's supported signal set is probed once at startup and turned into
//! an immutable [`SubscriptionTable`]. Dispatch never branches on host
//! version again.

use std::collections::BTreeSet;
use std::fmt;
use serde::{Serialize, Deserialize};

/// Priority of the host's own retry-decision listener on job failures
pub const RETRY_DECISION_PRIORITY: i32 = 100;

/// Priority of the fault listener on job failures, below the retry decision
pub const JOB_FAILED_PRIORITY: i32 = 64;

/// Name of the host listener that decides job retry intent
pub const RETRY_DECISION_LISTENER: &str = "messenger.retry_decision";

/// Kinds of lifecycle signals a host may raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// A request entered the host
    RequestReceived,
    /// Request handling raised a fault
    RequestFaulted,
    /// Legacy console fault signal
    ConsoleException,
    /// Replacement console fault signal
    ConsoleError,
    /// An asynchronous job failed
    JobFailed,
    /// An asynchronous job finished
    JobHandled,
}

impl SignalKind {
    /// Every signal kind
    pub const ALL: [SignalKind; 6] = [
        SignalKind::RequestReceived,
        SignalKind::RequestFaulted,
        SignalKind::ConsoleException,
        SignalKind::ConsoleError,
        SignalKind::JobFailed,
        SignalKind::JobHandled,
    ];

    /// Host-side signal name
    pub fn name(&self) -> &'static str {
        match self {
            SignalKind::RequestReceived => "kernel.request",
            SignalKind::RequestFaulted => "kernel.exception",
            SignalKind::ConsoleException => "console.exception",
            SignalKind::ConsoleError => "console.error",
            SignalKind::JobFailed => "messenger.worker_message_failed",
            SignalKind::JobHandled => "messenger.worker_message_handled",
        }
    }

    /// Looks a kind up by its host-side name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Listener entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handler {
    /// Registers the inbound request
    OnRequestReceived,
    /// Reports a request fault
    OnRequestFaulted,
    /// Reports a command fault
    OnCommandFaulted,
    /// Reports a job failure and flushes
    OnJobFailed,
    /// Flushes after a job
    OnJobHandled,
}

impl Handler {
    /// Handler name as exposed to the host registration mechanism
    pub fn name(&self) -> &'static str {
        match self {
            Handler::OnRequestReceived => "on_request_received",
            Handler::OnRequestFaulted => "on_request_faulted",
            Handler::OnCommandFaulted => "on_command_faulted",
            Handler::OnJobFailed => "on_job_failed",
            Handler::OnJobHandled => "on_job_handled",
        }
    }
}

/// Signal kinds supported by the running host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostCapabilities {
    supported: BTreeSet<SignalKind>,
}

impl HostCapabilities {
    /// Creates a capability set from the listed kinds
    pub fn new<I: IntoIterator<Item = SignalKind>>(kinds: I) -> Self {
        Self {
            supported: kinds.into_iter().collect(),
        }
    }

    /// Probes the host once per signal kind
    pub fn probe<F: FnMut(SignalKind) -> bool>(mut supports: F) -> Self {
        Self::new(SignalKind::ALL.iter().copied().filter(|kind| supports(*kind)))
    }

    /// A current host supporting every signal kind, including the legacy console signal
    pub fn all() -> Self {
        Self::new(SignalKind::ALL)
    }

    /// Returns true if the host raises signals of this kind
    pub fn supports(&self, kind: SignalKind) -> bool {
        self.supported.contains(&kind)
    }
}

/// One row of the registration table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    /// Signal received
    pub signal: SignalKind,
    /// Handler invoked
    pub handler: Handler,
    /// Priority among listeners of the same signal; higher runs earlier
    pub priority: i32,
    /// Host listener that must already have run on this signal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runs_after: Option<&'static str>,
}

impl Subscription {
    fn new(signal: SignalKind, handler: Handler, priority: i32) -> Self {
        Self {
            signal,
            handler,
            priority,
            runs_after: None,
        }
    }
}

/// Immutable registration table built from probed host capabilities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionTable {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionTable {
    /// Builds the table for a host.
    ///
    /// The legacy console signal is only subscribed when its replacement is
    /// unavailable. Job failures are received below the retry-decision
    /// listener so the retry intent is settled before a report is built.
    pub fn build(capabilities: &HostCapabilities) -> Self {
        let mut subscriptions = Vec::new();

        if capabilities.supports(SignalKind::RequestReceived) {
            subscriptions.push(Subscription::new(SignalKind::RequestReceived, Handler::OnRequestReceived, 256));
        }
        if capabilities.supports(SignalKind::RequestFaulted) {
            subscriptions.push(Subscription::new(SignalKind::RequestFaulted, Handler::OnRequestFaulted, 128));
        }

        if capabilities.supports(SignalKind::ConsoleError) {
            subscriptions.push(Subscription::new(SignalKind::ConsoleError, Handler::OnCommandFaulted, 128));
        } else if capabilities.supports(SignalKind::ConsoleException) {
            subscriptions.push(Subscription::new(SignalKind::ConsoleException, Handler::OnCommandFaulted, 128));
        }

        if capabilities.supports(SignalKind::JobFailed) {
            let mut failed = Subscription::new(SignalKind::JobFailed, Handler::OnJobFailed, JOB_FAILED_PRIORITY);
            failed.runs_after = Some(RETRY_DECISION_LISTENER);
            subscriptions.push(failed);
        }
        if capabilities.supports(SignalKind::JobHandled) {
            subscriptions.push(Subscription::new(SignalKind::JobHandled, Handler::OnJobHandled, 128));
        }

        tracing::debug!(
            subscriptions = subscriptions.len(),
            signals = ?subscriptions.iter().map(|s| s.signal.name()).collect::<Vec<_>>(),
            "Built fault listener subscription table"
        );

        Self { subscriptions }
    }

    /// Subscription for a signal kind, if subscribed
    pub fn get(&self, signal: SignalKind) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| s.signal == signal)
    }

    /// Subscription for a host-side signal name
    pub fn by_name(&self, name: &str) -> Option<&Subscription> {
        SignalKind::from_name(name).and_then(|kind| self.get(kind))
    }

    /// Returns true if the signal kind is subscribed
    pub fn contains(&self, signal: SignalKind) -> bool {
        self.get(signal).is_some()
    }

    /// All subscriptions in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter()
    }

    /// Number of subscriptions
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns true if nothing is subscribed
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
