//! Per-operation loading status.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Loading flags keyed by operation name, plus the most recent terminal
/// operation and its error, if it failed.
///
/// The request orchestrator is the only writer. Other components read it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingTable {
    #[serde(default)]
    loading: HashMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl LoadingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `operation` is in flight. Unknown operations are not loading.
    pub fn is_loading(&self, operation: &str) -> bool {
        self.loading.get(operation).copied().unwrap_or(false)
    }

    /// Name of the operation that most recently reached a terminal state.
    pub fn last_action(&self) -> Option<&str> {
        self.last_action.as_deref()
    }

    /// Error recorded by the most recent failed operation.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// `started` transition: flag set, previous error cleared.
    pub fn start(&mut self, operation: &str) {
        self.loading.insert(operation.to_string(), true);
        self.error = None;
    }

    /// `done` transition.
    pub fn finish(&mut self, operation: &str) {
        self.loading.insert(operation.to_string(), false);
        self.last_action = Some(operation.to_string());
    }

    /// `failed` transition.
    pub fn fail(&mut self, operation: &str, error: impl Into<String>) {
        self.loading.insert(operation.to_string(), false);
        self.last_action = Some(operation.to_string());
        self.error = Some(error.into());
    }
}

/// Application state that embeds a [`LoadingTable`].
pub trait Tracked {
    fn loading(&self) -> &LoadingTable;
    fn loading_mut(&mut self) -> &mut LoadingTable;
}

impl Tracked for LoadingTable {
    fn loading(&self) -> &LoadingTable {
        self
    }

    fn loading_mut(&mut self) -> &mut LoadingTable {
        self
    }
}
