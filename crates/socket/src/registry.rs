//! Connection registry: one live connection per socket descriptor.
//!
//! Owns every connection entry, publishes lifecycle and message events to
//! any number of subscribers, and applies the reconnection policy after
//! unclean closes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::SocketError;
use crate::reconnection::{ConnectOrigin, RegistryContext, connect_inner};
use crate::transport::{Connector, TungsteniteConnector};
use crate::types::{ReadyState, SocketConfig, SocketEvent};

/// Capacity of the lifecycle event channel.
const EVENT_CAPACITY: usize = 256;

/// Registry of named WebSocket connections.
pub struct ConnectionRegistry {
    ctx: RegistryContext,
}

impl ConnectionRegistry {
    /// Creates a registry that opens connections through `connector`.
    pub fn new(config: SocketConfig, connector: Arc<dyn Connector>) -> Result<Self, SocketError> {
        config.validate()?;
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            ctx: RegistryContext {
                config: Arc::new(config),
                connector,
                connections: Arc::new(Mutex::new(HashMap::new())),
                events_tx,
                shutdown: CancellationToken::new(),
            },
        })
    }

    /// Creates a registry backed by `tokio-tungstenite`.
    pub fn with_tungstenite(config: SocketConfig) -> Result<Self, SocketError> {
        let connector = TungsteniteConnector::new(config.max_message_size);
        Self::new(config, Arc::new(connector))
    }

    pub fn config(&self) -> &SocketConfig {
        &self.ctx.config
    }

    /// Subscribes to lifecycle and message events of every connection.
    pub fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.ctx.events_tx.subscribe()
    }

    /// Opens `{socket_url}{uri}?token={token}` under `descriptor`.
    ///
    /// Does nothing while the descriptor's connection is open or still
    /// opening. Returns once the attempt has started; completion is
    /// reported as [`SocketEvent::Opened`] or [`SocketEvent::Closed`].
    pub async fn connect(
        &self,
        descriptor: impl Into<String>,
        token: impl Into<String>,
        uri: impl Into<String>,
    ) {
        connect_inner(
            self.ctx.clone(),
            descriptor.into(),
            token.into(),
            uri.into(),
            ConnectOrigin::Caller,
        )
        .await;
    }

    /// Closes the descriptor's connection normally. A clean close is never
    /// followed by a reconnect.
    ///
    /// Unknown descriptors are ignored. Disconnecting a connection that is
    /// already closed forgets it, which also drops a pending reconnect.
    pub async fn disconnect(&self, descriptor: &str) {
        let mut connections = self.ctx.connections.lock().await;
        let Some(entry) = connections.get(descriptor) else {
            debug!(descriptor, "disconnect for unknown descriptor, ignoring");
            return;
        };

        match entry.ready.get() {
            ReadyState::Closed => {
                debug!(descriptor, "forgetting closed connection");
                connections.remove(descriptor);
            }
            ReadyState::Closing => {
                debug!(descriptor, "connection already closing");
            }
            ReadyState::Connecting | ReadyState::Open => {
                info!(descriptor, "disconnecting");
                entry.ready.set(ReadyState::Closing);
                entry.close.cancel();
            }
        }
    }

    /// Readiness of the descriptor's connection, `None` if unknown.
    pub async fn state(&self, descriptor: &str) -> Option<ReadyState> {
        let connections = self.ctx.connections.lock().await;
        connections.get(descriptor).map(|entry| entry.ready.get())
    }

    /// Queues a text frame on the descriptor's open connection.
    pub async fn send(&self, descriptor: &str, text: impl Into<String>) -> Result<(), SocketError> {
        let write_tx = {
            let connections = self.ctx.connections.lock().await;
            let entry = connections
                .get(descriptor)
                .ok_or_else(|| SocketError::UnknownDescriptor(descriptor.to_string()))?;
            if entry.ready.get() != ReadyState::Open {
                return Err(SocketError::NotOpen(descriptor.to_string()));
            }
            entry.write_tx.clone()
        };

        let text: String = text.into();
        write_tx
            .send(tungstenite::Message::Text(text.into()))
            .await
            .map_err(|_| SocketError::Closed)
    }

    /// Descriptors with a registry entry, in no particular order.
    pub async fn descriptors(&self) -> Vec<String> {
        self.ctx.connections.lock().await.keys().cloned().collect()
    }

    /// Closes every connection cleanly and stops pending reconnects.
    /// Later `connect` calls are ignored.
    pub fn shutdown(&self) {
        info!("shutting down connection registry");
        self.ctx.shutdown.cancel();
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.ctx.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::MockConnector;
    use crate::types::CloseInfo;
    use tokio::time::Instant;

    fn registry(connector: Arc<MockConnector>) -> ConnectionRegistry {
        let config = SocketConfig::default().with_socket_url("wss://host");
        ConnectionRegistry::new(config, connector).unwrap()
    }

    async fn next(events: &mut broadcast::Receiver<SocketEvent>) -> SocketEvent {
        events.recv().await.unwrap()
    }

    fn opened(reconnected: bool) -> SocketEvent {
        SocketEvent::Opened {
            descriptor: "chat".into(),
            reconnected,
        }
    }

    fn closed(close: CloseInfo) -> SocketEvent {
        SocketEvent::Closed {
            descriptor: "chat".into(),
            close,
        }
    }

    fn reconnecting() -> SocketEvent {
        SocketEvent::Reconnecting {
            descriptor: "chat".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_opens_under_descriptor() {
        let connector = MockConnector::responsive();
        let registry = registry(Arc::clone(&connector));
        let mut events = registry.subscribe();

        registry.connect("chat", "tok", "/chat").await;
        assert_eq!(next(&mut events).await, opened(false));

        assert_eq!(registry.state("chat").await, Some(ReadyState::Open));
        assert_eq!(registry.state("feed").await, None);
        assert_eq!(connector.urls(), vec!["wss://host/chat?token=tok".to_string()]);
        assert_eq!(registry.descriptors().await, vec!["chat".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn double_connect_keeps_one_connection_and_one_heartbeat() {
        let connector = MockConnector::responsive();
        let registry = registry(Arc::clone(&connector));
        let mut events = registry.subscribe();

        registry.connect("chat", "tok", "/chat").await;
        registry.connect("chat", "tok", "/chat").await;
        assert_eq!(next(&mut events).await, opened(false));
        registry.connect("chat", "tok", "/chat").await;

        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(connector.attempts(), 1);
        assert_eq!(connector.server(0).pings(), 1);
        assert_eq!(registry.state("chat").await, Some(ReadyState::Open));
    }

    #[tokio::test(start_paused = true)]
    async fn answered_probes_keep_connection_open() {
        let connector = MockConnector::responsive();
        let registry = registry(Arc::clone(&connector));
        let mut events = registry.subscribe();

        registry.connect("chat", "tok", "/chat").await;
        assert_eq!(next(&mut events).await, opened(false));

        tokio::time::sleep(Duration::from_secs(5 * 60 + 5)).await;

        assert_eq!(connector.server(0).pings(), 10);
        assert_eq!(registry.state("chat").await, Some(ReadyState::Open));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn missed_reply_closes_with_4008_and_reconnects_once() {
        let connector = MockConnector::silent();
        let registry = registry(Arc::clone(&connector));
        let mut events = registry.subscribe();
        let start = Instant::now();

        registry.connect("chat", "tok", "/chat").await;
        assert_eq!(next(&mut events).await, opened(false));

        assert_eq!(next(&mut events).await, closed(CloseInfo::ping_timeout()));
        assert_eq!(start.elapsed(), Duration::from_secs(40));
        assert_eq!(connector.server(0).close_codes(), vec![4008]);

        assert_eq!(next(&mut events).await, reconnecting());
        assert_eq!(next(&mut events).await, opened(true));
        assert_eq!(start.elapsed(), Duration::from_secs(50));

        let urls = connector.urls();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], urls[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_clean_and_never_reconnects() {
        let connector = MockConnector::responsive();
        let registry = registry(Arc::clone(&connector));
        let mut events = registry.subscribe();

        registry.connect("chat", "tok", "/chat").await;
        assert_eq!(next(&mut events).await, opened(false));

        registry.disconnect("chat").await;
        assert_eq!(next(&mut events).await, closed(CloseInfo::clean(1000, "")));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 1);
        assert_eq!(connector.server(0).close_codes(), vec![1000]);
        assert_eq!(registry.state("chat").await, Some(ReadyState::Closed));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_right_after_disconnect_still_closes_old_connection() {
        let connector = MockConnector::responsive();
        let registry = registry(Arc::clone(&connector));
        let mut events = registry.subscribe();

        registry.connect("chat", "tok", "/chat").await;
        assert_eq!(next(&mut events).await, opened(false));

        registry.disconnect("chat").await;
        registry.connect("chat", "tok2", "/chat").await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.len(), 2, "unexpected events {seen:?}");
        assert!(seen.contains(&closed(CloseInfo::clean(1000, ""))));
        assert!(seen.contains(&opened(false)));
        assert_eq!(connector.server(0).close_codes(), vec![1000]);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 2);
        assert_eq!(connector.urls()[1], "wss://host/chat?token=tok2");
        assert_eq!(registry.state("chat").await, Some(ReadyState::Open));
    }

    #[tokio::test(start_paused = true)]
    async fn unclean_server_close_reconnects_to_same_uri() {
        let connector = MockConnector::responsive();
        let registry = registry(Arc::clone(&connector));
        let mut events = registry.subscribe();

        registry.connect("chat", "tok", "/chat").await;
        assert_eq!(next(&mut events).await, opened(false));

        connector.server(0).close(4001);
        match next(&mut events).await {
            SocketEvent::Closed { close, .. } => {
                assert_eq!(close.code, 4001);
                assert!(!close.was_clean);
            }
            other => panic!("expected close, got {other:?}"),
        }

        assert_eq!(next(&mut events).await, reconnecting());
        assert_eq!(next(&mut events).await, opened(true));
        assert_eq!(
            connector.urls(),
            vec![
                "wss://host/chat?token=tok".to_string(),
                "wss://host/chat?token=tok".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn normal_server_close_does_not_reconnect() {
        let connector = MockConnector::responsive();
        let registry = registry(Arc::clone(&connector));
        let mut events = registry.subscribe();

        registry.connect("chat", "tok", "/chat").await;
        assert_eq!(next(&mut events).await, opened(false));

        connector.server(0).close(1000);
        assert_eq!(next(&mut events).await, closed(CloseInfo::clean(1000, "")));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_reopen_preempts_scheduled_reconnect() {
        let connector = MockConnector::responsive();
        let registry = registry(Arc::clone(&connector));
        let mut events = registry.subscribe();

        registry.connect("chat", "tok", "/chat").await;
        assert_eq!(next(&mut events).await, opened(false));

        connector.server(0).fail();
        assert!(matches!(
            next(&mut events).await,
            SocketEvent::Closed { close, .. } if !close.was_clean
        ));

        registry.connect("chat", "tok", "/chat").await;
        assert_eq!(next(&mut events).await, opened(false));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(connector.attempts(), 2);
        assert!(events.try_recv().is_err(), "no reconnect may follow");
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_delay_drops_pending_reconnect() {
        let connector = MockConnector::responsive();
        let registry = registry(Arc::clone(&connector));
        let mut events = registry.subscribe();

        registry.connect("chat", "tok", "/chat").await;
        assert_eq!(next(&mut events).await, opened(false));

        connector.server(0).fail();
        assert!(matches!(next(&mut events).await, SocketEvent::Closed { .. }));

        registry.disconnect("chat").await;
        assert_eq!(registry.state("chat").await, None);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_open_is_unclean_and_retried() {
        let connector = MockConnector::responsive();
        connector.refuse_next(1);
        let registry = registry(Arc::clone(&connector));
        let mut events = registry.subscribe();

        registry.connect("chat", "tok", "/chat").await;
        match next(&mut events).await {
            SocketEvent::Closed { close, .. } => {
                assert_eq!(close.code, 1006);
                assert!(!close.was_clean);
            }
            other => panic!("expected close, got {other:?}"),
        }

        assert_eq!(next(&mut events).await, reconnecting());
        assert_eq!(next(&mut events).await, opened(true));
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_text_is_published() {
        let connector = MockConnector::responsive();
        let registry = registry(Arc::clone(&connector));
        let mut events = registry.subscribe();

        registry.connect("chat", "tok", "/chat").await;
        assert_eq!(next(&mut events).await, opened(false));

        connector.server(0).push_text(r#"{"type":"chat.message","data":"hi"}"#);
        assert_eq!(
            next(&mut events).await,
            SocketEvent::Message {
                descriptor: "chat".into(),
                text: r#"{"type":"chat.message","data":"hi"}"#.into(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn send_requires_open_connection() {
        let connector = MockConnector::responsive();
        let registry = registry(Arc::clone(&connector));
        let mut events = registry.subscribe();

        assert!(matches!(
            registry.send("chat", "hello").await,
            Err(SocketError::UnknownDescriptor(_))
        ));

        registry.connect("chat", "tok", "/chat").await;
        assert_eq!(next(&mut events).await, opened(false));
        registry.send("chat", "hello").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connector.server(0).sent_texts(), vec!["hello".to_string()]);

        registry.disconnect("chat").await;
        assert!(matches!(next(&mut events).await, SocketEvent::Closed { .. }));
        assert!(matches!(
            registry.send("chat", "late").await,
            Err(SocketError::NotOpen(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_unknown_descriptor_is_noop() {
        let registry = registry(MockConnector::responsive());
        registry.disconnect("nope").await;
        assert_eq!(registry.state("nope").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_everything_cleanly() {
        let connector = MockConnector::responsive();
        let registry = registry(Arc::clone(&connector));
        let mut events = registry.subscribe();

        registry.connect("chat", "tok", "/chat").await;
        assert_eq!(next(&mut events).await, opened(false));

        registry.shutdown();
        assert_eq!(next(&mut events).await, closed(CloseInfo::clean(1000, "")));

        registry.connect("chat", "tok", "/chat").await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.attempts(), 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SocketConfig {
            pong_timeout: Duration::from_secs(60),
            ..SocketConfig::default()
        };
        let result = ConnectionRegistry::new(config, MockConnector::responsive());
        assert!(matches!(result, Err(SocketError::Config(_))));
    }
}
