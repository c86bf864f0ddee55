//! Socket control actions.
//!
//! Every socket action is a flat JSON object tagged by `type` and marked with
//! `"meta": "SOCKET_COMMAND"`. Anything without that marker is an ordinary
//! application action that the bridge lets through untouched.

use serde::{Deserialize, Serialize};

use crate::envelope::InboundEvent;

/// The `meta` marker. Only one value exists; deserialization of any other
/// marker fails, which is how foreign actions are told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommandMeta {
    #[default]
    #[serde(rename = "SOCKET_COMMAND")]
    SocketCommand,
}

/// Socket session commands and the lifecycle actions derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SocketCommand {
    /// Open (or reuse) the connection for a descriptor.
    #[serde(rename = "SOCKET_CONNECT", rename_all = "camelCase")]
    Connect {
        socket_descriptor: String,
        token: String,
        uri: String,
    },
    /// Close the connection for a descriptor normally.
    #[serde(rename = "SOCKET_DISCONNECT", rename_all = "camelCase")]
    Disconnect {
        socket_descriptor: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        token: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        uri: String,
    },
    /// A connection finished opening.
    #[serde(rename = "SOCKET_CONNECTED", rename_all = "camelCase")]
    Connected { socket_descriptor: String },
    /// A connection closed.
    #[serde(rename = "SOCKET_CLOSED", rename_all = "camelCase")]
    Closed {
        socket_descriptor: String,
        was_clean: bool,
    },
    /// An application event arrived on a connection.
    #[serde(rename = "SOCKET_RECEIVE", rename_all = "camelCase")]
    Receive {
        socket_descriptor: String,
        payload: InboundEvent,
    },
    /// A scheduled reconnect attempt started.
    #[serde(rename = "SOCKET_RECONNECT", rename_all = "camelCase")]
    Reconnect { socket_descriptor: String },
    /// A reconnect attempt opened a connection.
    #[serde(rename = "SOCKET_RECONNECTED", rename_all = "camelCase")]
    Reconnected { socket_descriptor: String },
}

impl SocketCommand {
    /// Descriptor the command refers to.
    pub fn descriptor(&self) -> &str {
        match self {
            Self::Connect {
                socket_descriptor, ..
            }
            | Self::Disconnect {
                socket_descriptor, ..
            }
            | Self::Connected { socket_descriptor }
            | Self::Closed {
                socket_descriptor, ..
            }
            | Self::Receive {
                socket_descriptor, ..
            }
            | Self::Reconnect { socket_descriptor }
            | Self::Reconnected { socket_descriptor } => socket_descriptor,
        }
    }

    /// Wraps the command into a marked action.
    pub fn into_action(self) -> Action {
        Action::Socket(CommandEnvelope {
            command: self,
            meta: CommandMeta::SocketCommand,
        })
    }
}

/// A socket command together with its `meta` marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    #[serde(flatten)]
    pub command: SocketCommand,
    pub meta: CommandMeta,
}

/// Anything flowing through the action stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Action {
    Socket(CommandEnvelope),
    Other(serde_json::Value),
}

impl Action {
    /// Classifies a raw JSON action.
    pub fn from_value(value: serde_json::Value) -> Self {
        match serde_json::from_value::<CommandEnvelope>(value.clone()) {
            Ok(envelope) => Self::Socket(envelope),
            Err(_) => Self::Other(value),
        }
    }

    /// The socket command, if this action carries one.
    pub fn as_socket(&self) -> Option<&SocketCommand> {
        match self {
            Self::Socket(envelope) => Some(&envelope.command),
            Self::Other(_) => None,
        }
    }
}

impl From<SocketCommand> for Action {
    fn from(command: SocketCommand) -> Self {
        command.into_action()
    }
}

/// Builds connect/disconnect commands for one endpoint.
///
/// With [`per_session`](Self::per_session) the session id is appended to the
/// URI as `{uri}/{session_id}/`.
#[derive(Debug, Clone)]
pub struct SocketActionFactory {
    uri: String,
    descriptor: String,
    per_session: bool,
}

impl SocketActionFactory {
    pub fn new(uri: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            descriptor: descriptor.into(),
            per_session: false,
        }
    }

    pub fn per_session(mut self) -> Self {
        self.per_session = true;
        self
    }

    pub fn connect(&self, token: &str, session_id: Option<&str>) -> SocketCommand {
        SocketCommand::Connect {
            socket_descriptor: self.descriptor.clone(),
            token: token.to_string(),
            uri: self.resolve_uri(session_id),
        }
    }

    pub fn disconnect(&self, token: &str, session_id: Option<&str>) -> SocketCommand {
        SocketCommand::Disconnect {
            socket_descriptor: self.descriptor.clone(),
            token: token.to_string(),
            uri: self.resolve_uri(session_id),
        }
    }

    fn resolve_uri(&self, session_id: Option<&str>) -> String {
        match (self.per_session, session_id) {
            (true, Some(id)) => format!("{}/{id}/", self.uri),
            _ => self.uri.clone(),
        }
    }
}
