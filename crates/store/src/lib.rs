//! Application state container for statewire sessions.
//!
//! Mutations are applied to a cloned draft and published as a new snapshot,
//! so readers holding an older [`Arc`](std::sync::Arc) never observe a
//! partial update.

pub mod loading;
pub mod store;

pub use loading::{LoadingTable, Tracked};
pub use store::Store;
