//! Wire protocol types for statewire socket sessions.
//!
//! Covers the literal heartbeat tokens, the `{type, data}` envelope used
//! for application events, and the `SOCKET_COMMAND` control actions that
//! drive connections.

pub mod command;
pub mod constants;
pub mod envelope;

pub use command::{Action, CommandEnvelope, CommandMeta, SocketActionFactory, SocketCommand};
pub use envelope::{EventKey, InboundEvent};
