//! Session configuration.
//!
//! A single JSON file; every field has a default, so `{}` is a valid
//! configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use statewire_api::DEFAULT_AUTH_SCHEME;
use statewire_protocol::constants;
use statewire_socket::SocketConfig;

/// Errors produced while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Liveness probe timings, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub ping_interval_ms: u64,
    pub pong_timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: constants::PING_INTERVAL.as_millis() as u64,
            pong_timeout_ms: constants::PONG_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Prefix for every socket URI, e.g. `wss://example.com`.
    pub socket_url: String,
    /// Prefix for every operation path, e.g. `https://example.com/api`.
    pub api_url: String,
    /// Scheme of the `Authorization` header.
    pub auth_scheme: String,
    pub heartbeat: HeartbeatConfig,
    /// Delay before reconnecting after an unclean close.
    pub reconnect_delay_ms: u64,
    /// Inbound socket messages above this size are dropped.
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket_url: String::new(),
            api_url: String::new(),
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
            heartbeat: HeartbeatConfig::default(),
            reconnect_delay_ms: constants::RECONNECT_DELAY.as_millis() as u64,
            max_message_size: constants::MAX_MESSAGE_SIZE,
        }
    }
}

impl SessionConfig {
    /// Reads and validates a JSON configuration file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        tracing::debug!(path = %path.display(), "session configuration loaded");
        Ok(config)
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects heartbeat timings under which probes could overlap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid("max_message_size must be non-zero".into()));
        }
        Ok(())
    }

    /// Registry configuration derived from this configuration.
    pub fn socket_config(&self) -> SocketConfig {
        SocketConfig {
            socket_url: self.socket_url.clone(),
            ping_interval: Duration::from_millis(self.heartbeat.ping_interval_ms),
            pong_timeout: Duration::from_millis(self.heartbeat.pong_timeout_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_message_size: self.max_message_size,
        }
    }
}
