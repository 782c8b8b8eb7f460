//! # Reports
//!
//! The normalized, transport-ready fault record handed to the tracking
//! client. A report is built fresh for each qualifying signal and owned by
//! the client once submitted.

use std::collections::BTreeMap;
use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::config::Configuration;
use crate::context::RequestContext;
use crate::fault::Fault;
use crate::types::Severity;

/// Severity reason type for faults the host did not recover from
pub const UNHANDLED_EXCEPTION_MIDDLEWARE: &str = "unhandledExceptionMiddleware";

/// Metadata groups: group name to key/value facts
pub type Metadata = BTreeMap<String, serde_json::Map<String, serde_json::Value>>;

/// Why a report carries its severity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityReason {
    /// Reason tag
    #[serde(rename = "type")]
    pub reason_type: String,
    /// Additional attributes of the reason
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl SeverityReason {
    /// Reason for a fault caught by the listener on behalf of a host framework
    pub fn unhandled_exception_middleware<S: Into<String>>(framework: S) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert("framework".to_string(), framework.into());
        Self {
            reason_type: UNHANDLED_EXCEPTION_MIDDLEWARE.to_string(),
            attributes,
        }
    }
}

/// A fault report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Unique identifier of this report
    pub id: Uuid,
    /// When the report was built
    pub timestamp: DateTime<Utc>,
    /// The underlying fault
    pub error: Fault,
    /// True when the host did not recover from the fault
    pub unhandled: bool,
    /// Report severity
    pub severity: Severity,
    /// Why the report has its severity
    pub severity_reason: SeverityReason,
    /// Metadata groups
    #[serde(rename = "metaData")]
    pub metadata: Metadata,
    /// The request being served when the fault occurred
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestContext>,
    /// Classification of the process that raised the fault (e.g. "HTTP")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_type: Option<String>,
}

impl Report {
    /// Creates a handled, warning-level report for the given fault
    pub fn new(error: Fault) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            error,
            unhandled: false,
            severity: Severity::Warning,
            severity_reason: SeverityReason {
                reason_type: "handledException".to_string(),
                attributes: BTreeMap::new(),
            },
            metadata: Metadata::new(),
            request: None,
            app_type: None,
        }
    }

    /// Creates a report for a fault the host did not recover from
    pub fn unhandled(error: Fault, config: &Configuration) -> Self {
        let mut report = Self::new(error);
        report.unhandled = true;
        report.severity = Severity::Error;
        report.severity_reason = SeverityReason::unhandled_exception_middleware(config.framework.clone());
        report
    }

    /// Adds a key/value fact to a metadata group
    pub fn add_metadata<G, K, V>(&mut self, group: G, key: K, value: V) -> &mut Self
    where
        G: Into<String>,
        K: Into<String>,
        V: Serialize,
    {
        if let Ok(value) = serde_json::to_value(value) {
            self.metadata
                .entry(group.into())
                .or_default()
                .insert(key.into(), value);
        }
        self
    }

    /// Merges whole metadata groups into the report
    pub fn merge_metadata(&mut self, metadata: Metadata) -> &mut Self {
        for (group, facts) in metadata {
            self.metadata.entry(group).or_default().extend(facts);
        }
        self
    }

    /// Attaches the request being served
    pub fn with_request(mut self, request: RequestContext) -> Self {
        self.request = Some(request);
        self
    }

    /// Sets the process classification
    pub fn with_app_type<S: Into<String>>(mut self, app_type: S) -> Self {
        self.app_type = Some(app_type.into());
        self
    }

    /// Looks up a metadata fact
    pub fn metadata_value(&self, group: &str, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(group).and_then(|facts| facts.get(key))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.error)?;
        if self.unhandled {
            write!(f, " (unhandled)")?;
        }
        if let Some(app_type) = &self.app_type {
            write!(f, " [{}]", app_type)?;
        }
        Ok(())
    }
}
