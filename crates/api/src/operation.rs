//! Declared HTTP operations.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Request payload: a flat JSON object.
pub type Payload = Map<String, Value>;

/// Mutation run on the `started` transition.
pub type StartFn<S> = Arc<dyn Fn(&mut S, &Payload) + Send + Sync>;

/// Mutation run on a terminal transition with `(result or error, payload)`.
pub type OutcomeFn<S> = Arc<dyn Fn(&mut S, &Value, &Payload) + Send + Sync>;

/// HTTP method of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the payload is encoded for non-GET requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestKind {
    /// JSON body with `Content-Type: application/json`.
    #[default]
    Json,
    /// Multipart form with one text field per payload key.
    Form,
}

/// A named HTTP call and the state mutations bound to its transitions.
pub struct Operation<S> {
    pub(crate) name: String,
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) kind: RequestKind,
    pub(crate) on_start: Option<StartFn<S>>,
    pub(crate) on_success: Option<OutcomeFn<S>>,
    pub(crate) on_fail: Option<OutcomeFn<S>>,
}

impl<S> Operation<S> {
    /// Declares an operation. `path` is relative to the API base URL and
    /// may contain `:param` segments filled from the payload.
    pub fn new(name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            kind: RequestKind::Json,
            on_start: None,
            on_success: None,
            on_fail: None,
        }
    }

    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Get, path)
    }

    pub fn post(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Post, path)
    }

    pub fn put(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Put, path)
    }

    pub fn patch(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Patch, path)
    }

    pub fn delete(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Delete, path)
    }

    /// Sends the payload as a multipart form instead of JSON.
    pub fn form(mut self) -> Self {
        self.kind = RequestKind::Form;
        self
    }

    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut S, &Payload) + Send + Sync + 'static,
    {
        self.on_start = Some(Arc::new(f));
        self
    }

    /// Mutation applied with `(state, result, payload)` on a 2xx response.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut S, &Value, &Payload) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// Mutation applied with `(state, error, payload)` on failure. The error
    /// is the response body for non-2xx statuses, or a string otherwise.
    pub fn on_fail<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut S, &Value, &Payload) + Send + Sync + 'static,
    {
        self.on_fail = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }
}

impl<S> fmt::Debug for Operation<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
