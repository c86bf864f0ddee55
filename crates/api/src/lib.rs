//! Declared HTTP operations for statewire sessions.
//!
//! An [`Operation`] names a call (method, path template, payload encoding)
//! and the state mutations bound to its `started`, `done` and `failed`
//! transitions. The [`RequestOrchestrator`] resolves auth and contextual
//! values from the store, performs the call through an [`HttpTransport`]
//! and records the outcome in the state's loading table.

pub mod error;
pub mod operation;
pub mod orchestrator;
mod path;
pub mod transport;

pub use error::{ApiError, TransportError};
pub use operation::{Method, Operation, Payload, RequestKind};
pub use orchestrator::{
    DEFAULT_AUTH_SCHEME, InvocationOutcome, OperationHandle, RequestOrchestrator, TokenSelector,
    ValueSelector,
};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, RequestBody};
