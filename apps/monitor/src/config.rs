//! Monitor configuration: session settings plus the sockets to open and
//! the events to count.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use statewire::{EventKey, SessionConfig};

/// One socket to open on startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketEntry {
    pub descriptor: String,
    pub uri: String,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    #[serde(flatten)]
    pub session: SessionConfig,
    pub sockets: Vec<SocketEntry>,
    /// `module.event` keys to route and count.
    pub listen: Vec<String>,
}

impl MonitorConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.session.validate()?;
        Ok(config)
    }

    /// Listened events grouped by namespace.
    pub fn listen_by_namespace(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for raw in &self.listen {
            let key = EventKey::parse(raw);
            grouped
                .entry(key.namespace().to_string())
                .or_default()
                .push(key.event().to_string());
        }
        grouped
    }
}
