use std::fmt;

use serde::{Deserialize, Serialize};

/// Routing key for an application event: `(namespace, event)`.
///
/// On the wire the key is a single dotted string (`"chat.message"`). It is
/// split once, at the first `.`, so event names may themselves contain dots.
/// A type without any `.` has an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    namespace: String,
    event: String,
}

impl EventKey {
    pub fn new(namespace: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            event: event.into(),
        }
    }

    /// Parses a dotted wire type.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('.') {
            Some((namespace, event)) => Self::new(namespace, event),
            None => Self::new("", raw),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.event)
        } else {
            write!(f, "{}.{}", self.namespace, self.event)
        }
    }
}

/// Application event pushed by the server: `{"type": "module.event", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl InboundEvent {
    /// Creates an event for the given key.
    pub fn new(key: &EventKey, data: serde_json::Value) -> Self {
        Self {
            event_type: key.to_string(),
            data,
        }
    }

    /// Decodes a text frame.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Structured routing key for this event.
    pub fn key(&self) -> EventKey {
        EventKey::parse(&self.event_type)
    }
}
