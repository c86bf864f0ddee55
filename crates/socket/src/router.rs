//! Routes inbound application events to state mutations by `module.event`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{trace, warn};

use statewire_protocol::constants::is_liveness_reply;
use statewire_protocol::{EventKey, InboundEvent};
use statewire_store::Store;

/// Mutation applied to a state draft with the event's `data`.
pub type EventHandler<S> = Arc<dyn Fn(&mut S, &Value) + Send + Sync>;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The liveness reply; it never reaches the state.
    LivenessReply,
    /// A handler was applied.
    Applied(EventKey),
    /// No handler registered for the key; dropped.
    Unroutable(EventKey),
    /// Not an application event; dropped.
    Malformed,
}

/// Table of event handlers keyed by [`EventKey`].
pub struct EventRouter<S> {
    handlers: HashMap<EventKey, EventHandler<S>>,
}

impl<S> Default for EventRouter<S> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<S> fmt::Debug for EventRouter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("keys", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<S: Clone> EventRouter<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `key`. A later registration for the same key
    /// replaces the earlier one.
    pub fn register<F>(&mut self, key: EventKey, handler: F)
    where
        F: Fn(&mut S, &Value) + Send + Sync + 'static,
    {
        if self.handlers.insert(key.clone(), Arc::new(handler)).is_some() {
            warn!(event = %key, "event handler replaced");
        }
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &EventKey> {
        self.handlers.keys()
    }

    /// Routes a raw text frame.
    pub fn route_text(&self, store: &Store<S>, text: &str) -> RouteOutcome {
        if is_liveness_reply(text) {
            return RouteOutcome::LivenessReply;
        }
        match InboundEvent::decode(text) {
            Ok(event) => self.dispatch(store, &event),
            Err(e) => {
                warn!("dropping malformed socket message: {e}");
                RouteOutcome::Malformed
            }
        }
    }

    /// Applies the handler registered for the event's key, if any.
    pub fn dispatch(&self, store: &Store<S>, event: &InboundEvent) -> RouteOutcome {
        let key = event.key();
        match self.handlers.get(&key) {
            Some(handler) => {
                trace!(event = %key, "applying socket event");
                store.update(|state| handler(state, &event.data));
                RouteOutcome::Applied(key)
            }
            None => {
                warn!(event = %key, "no handler for socket event, dropping");
                RouteOutcome::Unroutable(key)
            }
        }
    }
}
