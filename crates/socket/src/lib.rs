//! Named WebSocket connections for statewire sessions.
//!
//! Provides the connection registry (one live connection per descriptor),
//! heartbeat supervision, single-shot reconnection after unclean closes,
//! the `module.event` router and the bridge that turns socket control
//! actions into registry calls.

pub mod bridge;
pub mod error;
pub(crate) mod heartbeat;
mod pumps;
pub(crate) mod reconnection;
pub mod registry;
pub mod router;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use bridge::SocketBridge;
pub use error::SocketError;
pub use registry::ConnectionRegistry;
pub use router::{EventHandler, EventRouter, RouteOutcome};
pub use transport::{Connector, FrameSink, FrameStream, TungsteniteConnector};
pub use types::{CloseInfo, ReadyState, SocketConfig, SocketEvent};
