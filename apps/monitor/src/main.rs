mod config;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use statewire::{Action, LoadingTable, Session, SocketCommand, StateModule, Tracked};

use config::MonitorConfig;

const DEFAULT_CONFIG: &str = "statewire-monitor.json";

/// Counts of routed events, keyed by `module.event`.
#[derive(Debug, Clone, Default)]
struct MonitorState {
    loading: LoadingTable,
    counts: BTreeMap<String, u64>,
}

impl Tracked for MonitorState {
    fn loading(&self) -> &LoadingTable {
        &self.loading
    }

    fn loading_mut(&mut self) -> &mut LoadingTable {
        &mut self.loading
    }
}

fn build_session(config: &MonitorConfig) -> anyhow::Result<Session<MonitorState>> {
    let mut builder = Session::builder(config.session.clone(), MonitorState::default());
    for (namespace, events) in config.listen_by_namespace() {
        let mut module = StateModule::new(namespace.as_str());
        for event in events {
            let key = if namespace.is_empty() {
                event.clone()
            } else {
                format!("{namespace}.{event}")
            };
            module = module.on_socket_event(event, move |state: &mut MonitorState, _data: &Value| {
                *state.counts.entry(key.clone()).or_default() += 1;
            });
        }
        builder = builder.module(module);
    }
    Ok(builder.build()?)
}

fn log_action(action: &Action) {
    match action.as_socket() {
        Some(SocketCommand::Closed {
            socket_descriptor,
            was_clean,
        }) => info!(descriptor = %socket_descriptor, was_clean, "socket closed"),
        Some(SocketCommand::Receive {
            socket_descriptor,
            payload,
        }) => debug!(descriptor = %socket_descriptor, event = %payload.event_type, "event received"),
        Some(command) => {
            let kind = serde_json::to_value(action)
                .ok()
                .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_default();
            info!(descriptor = %command.descriptor(), action = %kind, "socket action");
        }
        None => debug!("application action"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,statewire=debug")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = MonitorConfig::load(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;

    let session = build_session(&config)?;
    let mut actions = session.subscribe_actions();

    for socket in &config.sockets {
        session
            .connect(&socket.descriptor, &socket.token, &socket.uri)
            .await;
    }
    info!(sockets = config.sockets.len(), "monitor running, press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            received = actions.recv() => match received {
                Ok(action) => log_action(&action),
                Err(broadcast::error::RecvError::Lagged(n)) => warn!("monitor lagged, {n} actions skipped"),
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut ctrl_c => break,
        }
    }

    session.shutdown();
    for (key, count) in &session.snapshot().counts {
        info!(event = %key, count, "events received");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use statewire::RouteOutcome;

    #[tokio::test]
    async fn listened_events_are_counted() {
        let config: MonitorConfig = serde_json::from_str(
            r#"{"listen": ["chat.message", "feed.item"]}"#,
        )
        .unwrap();
        let session = build_session(&config).unwrap();

        let receive = serde_json::json!({
            "type": "SOCKET_RECEIVE",
            "meta": "SOCKET_COMMAND",
            "socketDescriptor": "chat",
            "payload": {"type": "chat.message", "data": {}}
        });
        assert!(matches!(
            session.dispatch_value(receive.clone()).await,
            Some(RouteOutcome::Applied(_))
        ));
        session.dispatch_value(receive).await;

        assert_eq!(session.snapshot().counts.get("chat.message"), Some(&2));
        assert_eq!(session.snapshot().counts.get("feed.item"), None);
    }
}
