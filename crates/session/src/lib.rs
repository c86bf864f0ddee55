//! Real-time session core.
//!
//! A [`Session`] combines [`StateModule`]s into one state store, one
//! registry of named WebSocket connections (heartbeat supervised,
//! reconnected after unclean closes, inbound events routed by
//! `module.event`) and one orchestrator of tracked HTTP operations.

pub mod config;
pub mod module;
pub mod session;

pub use config::{ConfigError, HeartbeatConfig, SessionConfig};
pub use module::StateModule;
pub use session::{Session, SessionBuilder, SessionError};

pub use statewire_api::{InvocationOutcome, Method, Operation, OperationHandle, Payload};
pub use statewire_protocol::{Action, EventKey, SocketActionFactory, SocketCommand};
pub use statewire_socket::{ReadyState, RouteOutcome};
pub use statewire_store::{LoadingTable, Store, Tracked};
