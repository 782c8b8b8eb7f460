//! # Buffered Tracking Client
//!
//! An in-process [`TrackingClient`] that queues submitted reports and hands
//! them to a [`Transport`] in batches. Wire formats and network delivery stay
//! with the transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use metrics::{counter, gauge};
use crate::client::TrackingClient;
use crate::config::Configuration;
use crate::context;
use crate::report::Report;
use crate::types::Result;

/// Delivers batches of reports to the error-tracking service
pub trait Transport: Send + Sync {
    /// Delivers one batch. The batch stays with the caller, which requeues it on failure.
    fn deliver(&self, batch: &[Report]) -> Result<()>;
}

/// Transport that emits each report as a structured log event
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

impl Transport for LogTransport {
    fn deliver(&self, batch: &[Report]) -> Result<()> {
        for report in batch {
            let payload = serde_json::to_string(report).unwrap_or_default();
            tracing::error!(
                report_id = %report.id,
                severity = %report.severity,
                class = %report.error.class,
                message = %report.error.message,
                unhandled = report.unhandled,
                app_type = report.app_type.as_deref().unwrap_or("unknown"),
                payload = %payload,
                "Fault report"
            );
        }
        Ok(())
    }
}

/// Transport that keeps delivered batches in memory
#[derive(Debug, Default)]
pub struct MemoryTransport {
    batches: Mutex<Vec<Vec<Report>>>,
}

impl MemoryTransport {
    /// Creates an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches delivered so far
    pub fn batches(&self) -> Vec<Vec<Report>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Every delivered report, in delivery order
    pub fn delivered(&self) -> Vec<Report> {
        self.batches().into_iter().flatten().collect()
    }
}

impl Transport for MemoryTransport {
    fn deliver(&self, batch: &[Report]) -> Result<()> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).push(batch.to_vec());
        Ok(())
    }
}

/// Tracking client buffering reports until flushed
pub struct BufferedClient {
    /// Configuration for the client
    config: Configuration,
    /// Destination of flushed batches
    transport: Arc<dyn Transport>,
    /// Reports waiting to be delivered
    queue: Mutex<VecDeque<Report>>,
    /// Recent reports kept in memory for inspection
    recent: RwLock<VecDeque<Report>>,
}

impl BufferedClient {
    /// Creates a client with the given configuration and transport
    pub fn new(config: Configuration, transport: Arc<dyn Transport>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(config.batch_size)),
            recent: RwLock::new(VecDeque::with_capacity(config.recent_limit)),
            config,
            transport,
        }
    }

    /// Number of reports waiting for a flush
    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Gets recent reports from memory
    pub fn recent_reports(&self) -> Vec<Report> {
        let recent = self.recent.read().unwrap_or_else(PoisonError::into_inner);
        recent.iter().cloned().collect()
    }

    /// Puts an undelivered batch back in front of the queue, dropping the
    /// oldest reports beyond `queue_limit`
    fn requeue(&self, batch: Vec<Report>) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        for report in batch.into_iter().rev() {
            queue.push_front(report);
        }

        let overflow = queue.len().saturating_sub(self.config.queue_limit);
        if overflow > 0 {
            queue.drain(..overflow);
            counter!("fault_reports.dropped", overflow as u64);
            tracing::warn!(dropped = overflow, limit = self.config.queue_limit, "Report queue over limit, oldest reports dropped");
        }
        gauge!("fault_reports.queued", queue.len() as f64);
    }

    fn remember(&self, report: &Report) {
        let mut recent = self.recent.write().unwrap_or_else(PoisonError::into_inner);
        recent.push_back(report.clone());

        while recent.len() > self.config.recent_limit {
            recent.pop_front();
        }
    }
}

impl TrackingClient for BufferedClient {
    fn set_fallback_classification(&self, classification: &str) {
        context::set_fallback_classification(classification);
    }

    fn memory_limit_increase(&self) -> Option<u64> {
        self.config.memory_limit_increase
    }

    fn submit(&self, mut report: Report) -> Result<()> {
        if report.app_type.is_none() {
            report.app_type = context::current_fallback_classification();
        }
        self.remember(&report);

        let batch_full = {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.push_back(report);
            gauge!("fault_reports.queued", queue.len() as f64);
            queue.len() >= self.config.batch_size
        };

        if batch_full {
            tracing::debug!(batch_size = self.config.batch_size, "Report queue full, flushing");
            // The report is accepted either way; a failed batch waits for the next flush
            if let Err(e) = self.flush() {
                tracing::warn!(error = %e, queued = self.queued(), "Automatic flush failed");
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let batch: Vec<Report> = {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.drain(..).collect()
        };
        if batch.is_empty() {
            return Ok(());
        }

        let size = batch.len();
        if let Err(e) = self.transport.deliver(&batch) {
            self.requeue(batch);
            return Err(e);
        }
        gauge!("fault_reports.queued", self.queued() as f64);
        counter!("fault_reports.delivered", size as u64);
        tracing::debug!(reports = size, "Flushed buffered reports");
        Ok(())
    }

    fn configuration(&self) -> Configuration {
        self.config.clone()
    }
}
