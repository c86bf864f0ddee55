//! Per-connection pumps: one task reads frames and supervises the
//! heartbeat, one task serialises outbound frames.

pub(crate) mod read;
pub(crate) mod write;
