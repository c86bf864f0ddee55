//! Public types for the connection registry.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use statewire_protocol::constants::{
    self, CLOSE_ABNORMAL, CLOSE_NORMAL, CLOSE_PING_TIMEOUT, PING_TIMEOUT_REASON,
};

use crate::error::SocketError;

/// Readiness of a connection, mirroring the WebSocket `readyState` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    /// Transport open in progress.
    Connecting = 0,
    /// Open; heartbeat running.
    Open = 1,
    /// Close requested, not yet finished.
    Closing = 2,
    /// Closed.
    Closed = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        })
    }
}

/// Ready state shared between the registry entry and its connection task.
#[derive(Debug, Clone)]
pub(crate) struct SharedReadyState(Arc<AtomicU8>);

impl SharedReadyState {
    pub(crate) fn new(state: ReadyState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    pub(crate) fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// How a connection ended.
///
/// `was_clean` is the only signal the reconnection policy looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseInfo {
    pub fn clean(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean: true,
        }
    }

    pub fn unclean(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean: false,
        }
    }

    /// Close caused by a missed liveness reply.
    pub fn ping_timeout() -> Self {
        Self::unclean(CLOSE_PING_TIMEOUT, PING_TIMEOUT_REASON)
    }

    /// Close sent by the server. Normal closure, or a close frame without a
    /// status code, counts as clean; every other code does not.
    pub fn from_server(code: Option<u16>, reason: impl Into<String>) -> Self {
        match code {
            None | Some(CLOSE_NORMAL) => Self::clean(code.unwrap_or(CLOSE_NORMAL), reason),
            Some(code) => Self::unclean(code, reason),
        }
    }

    /// Transport failure without a close handshake.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::unclean(CLOSE_ABNORMAL, reason)
    }
}

/// Lifecycle and message events published by the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A connection finished opening.
    Opened {
        descriptor: String,
        /// `true` when the connection was opened by a scheduled reconnect.
        reconnected: bool,
    },
    /// A connection closed.
    Closed {
        descriptor: String,
        close: CloseInfo,
    },
    /// A non-heartbeat text frame arrived.
    Message { descriptor: String, text: String },
    /// A scheduled reconnect attempt is starting.
    Reconnecting { descriptor: String },
}

impl SocketEvent {
    pub fn descriptor(&self) -> &str {
        match self {
            Self::Opened { descriptor, .. }
            | Self::Closed { descriptor, .. }
            | Self::Message { descriptor, .. }
            | Self::Reconnecting { descriptor } => descriptor,
        }
    }
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Prefix joined with every connect URI.
    pub socket_url: String,
    /// Interval between liveness probes.
    pub ping_interval: Duration,
    /// Deadline for the reply to a probe. Strictly shorter than the interval.
    pub pong_timeout: Duration,
    /// Delay before the reconnect attempt after an unclean close.
    pub reconnect_delay: Duration,
    /// Inbound messages larger than this are dropped.
    pub max_message_size: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            socket_url: String::new(),
            ping_interval: constants::PING_INTERVAL,
            pong_timeout: constants::PONG_TIMEOUT,
            reconnect_delay: constants::RECONNECT_DELAY,
            max_message_size: constants::MAX_MESSAGE_SIZE,
        }
    }
}

impl SocketConfig {
    pub fn with_socket_url(mut self, socket_url: impl Into<String>) -> Self {
        self.socket_url = socket_url.into();
        self
    }

    /// Checks the heartbeat timings. Probes never overlap only when the
    /// reply deadline is shorter than the probe interval.
    pub fn validate(&self) -> Result<(), SocketError> {
        if self.ping_interval.is_zero() {
            return Err(SocketError::Config("ping interval must be non-zero".into()));
        }
        if self.pong_timeout.is_zero() || self.pong_timeout >= self.ping_interval {
            return Err(SocketError::Config(format!(
                "pong timeout ({:?}) must be non-zero and shorter than the ping interval ({:?})",
                self.pong_timeout, self.ping_interval
            )));
        }
        Ok(())
    }
}
