//! # Request Context
//!
//! The "current inbound request" register. Each thread carries its own slot,
//! so a single listener shared by concurrent request workers attaches the
//! right request to each report. A new primary request overwrites the slot;
//! nothing accumulates across requests.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

thread_local! {
    static REQUEST_SCOPE: RefCell<RequestScope> = RefCell::new(RequestScope::default());
}

/// Facts about the inbound request being served
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// HTTP method
    pub method: String,
    /// Full request URL
    pub url: String,
    /// Matched route name, if routing already ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Client address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    /// Authenticated user identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Query and body parameters
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl RequestContext {
    /// Creates a context for the given method and URL
    pub fn new<M: Into<String>, U: Into<String>>(method: M, url: U) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the matched route
    pub fn route<S: Into<String>>(mut self, route: S) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Sets the client address
    pub fn client_ip<S: Into<String>>(mut self, ip: S) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    /// Sets the authenticated user
    pub fn user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Adds a request header
    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds a request parameter
    pub fn param<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Serialize,
    {
        if let Ok(value) = serde_json::to_value(value) {
            self.params.insert(key.into(), value);
        }
        self
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        if let Some(route) = &self.route {
            write!(f, " (route: {})", route)?;
        }
        Ok(())
    }
}

/// Per-thread request state
#[derive(Debug, Clone, Default)]
struct RequestScope {
    request: Option<RequestContext>,
    classification: Option<String>,
}

/// Registers the request being served on the current thread
pub fn set_request_context(request: RequestContext) {
    REQUEST_SCOPE.with(|scope| {
        scope.borrow_mut().request = Some(request);
    });
}

/// Retrieves the request being served on the current thread
pub fn current_request_context() -> Option<RequestContext> {
    REQUEST_SCOPE.with(|scope| scope.borrow().request.clone())
}

/// Sets the fallback classification for reports raised on the current thread
pub fn set_fallback_classification<S: Into<String>>(classification: S) {
    REQUEST_SCOPE.with(|scope| {
        scope.borrow_mut().classification = Some(classification.into());
    });
}

/// Retrieves the fallback classification for the current thread
pub fn current_fallback_classification() -> Option<String> {
    REQUEST_SCOPE.with(|scope| scope.borrow().classification.clone())
}

/// Clears the request scope of the current thread
pub fn clear_request_scope() {
    REQUEST_SCOPE.with(|scope| {
        *scope.borrow_mut() = RequestScope::default();
    });
}

/// Executes a function with a specific request registered, restoring the
/// previous scope afterwards
pub fn with_request_context<F, R>(request: RequestContext, f: F) -> R
where
    F: FnOnce() -> R,
{
    let previous = REQUEST_SCOPE.with(|scope| scope.borrow().clone());
    set_request_context(request);

    let result = f();

    REQUEST_SCOPE.with(|scope| {
        *scope.borrow_mut() = previous;
    });
    result
}
