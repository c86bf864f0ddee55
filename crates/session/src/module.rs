//! State modules: one namespace's socket listeners, local events and
//! operations, declared together.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use statewire_api::Operation;
use statewire_socket::EventHandler;

/// Declarations contributed by one namespace.
///
/// Socket listeners are routed by `{namespace}.{event}`. Local events use
/// the same keys but are only ever triggered by
/// [`Session::emit_local`](crate::Session::emit_local).
pub struct StateModule<S> {
    namespace: String,
    pub(crate) listeners: Vec<(String, EventHandler<S>)>,
    pub(crate) local_events: Vec<(String, EventHandler<S>)>,
    pub(crate) operations: Vec<Operation<S>>,
}

impl<S> StateModule<S> {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            listeners: Vec::new(),
            local_events: Vec::new(),
            operations: Vec::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Handles the socket event `{namespace}.{event}`.
    pub fn on_socket_event<F>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut S, &Value) + Send + Sync + 'static,
    {
        self.listeners.push((event.into(), Arc::new(handler)));
        self
    }

    /// Declares a local event: a mutation applied without any traffic.
    pub fn on_local_event<F>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut S, &Value) + Send + Sync + 'static,
    {
        self.local_events.push((event.into(), Arc::new(handler)));
        self
    }

    pub fn operation(mut self, operation: Operation<S>) -> Self {
        self.operations.push(operation);
        self
    }
}

impl<S> fmt::Debug for StateModule<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateModule")
            .field("namespace", &self.namespace)
            .field("listeners", &self.listeners.len())
            .field("local_events", &self.local_events.len())
            .field("operations", &self.operations)
            .finish()
    }
}
