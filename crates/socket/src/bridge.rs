//! Bridge between the action stream and the connection registry.
//!
//! Socket control actions become registry calls; registry events come back
//! as lifecycle actions (`SOCKET_CONNECTED`, `SOCKET_CLOSED`,
//! `SOCKET_RECONNECT`, `SOCKET_RECONNECTED`, `SOCKET_RECEIVE`). Every action,
//! including ones the bridge does not understand, is republished to
//! subscribers unchanged.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use statewire_protocol::{Action, InboundEvent, SocketCommand};
use statewire_store::Store;

use crate::registry::ConnectionRegistry;
use crate::router::{EventRouter, RouteOutcome};
use crate::types::SocketEvent;

/// Capacity of the action channel.
const ACTION_CAPACITY: usize = 256;

pub struct SocketBridge<S> {
    registry: Arc<ConnectionRegistry>,
    router: Arc<EventRouter<S>>,
    store: Store<S>,
    actions_tx: broadcast::Sender<Action>,
}

impl<S> SocketBridge<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(registry: Arc<ConnectionRegistry>, router: EventRouter<S>, store: Store<S>) -> Self {
        let (actions_tx, _) = broadcast::channel(ACTION_CAPACITY);
        Self {
            registry,
            router: Arc::new(router),
            store,
            actions_tx,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &EventRouter<S> {
        &self.router
    }

    pub fn store(&self) -> &Store<S> {
        &self.store
    }

    /// Subscribes to every action passing through the bridge.
    pub fn subscribe(&self) -> broadcast::Receiver<Action> {
        self.actions_tx.subscribe()
    }

    /// Publishes `action`, then performs its socket side effect, if any.
    ///
    /// Returns the routing outcome for `SOCKET_RECEIVE` actions.
    pub async fn dispatch(&self, action: Action) -> Option<RouteOutcome> {
        let _ = self.actions_tx.send(action.clone());

        match action.as_socket()? {
            SocketCommand::Connect {
                socket_descriptor,
                token,
                uri,
            } => {
                self.registry
                    .connect(socket_descriptor.as_str(), token.as_str(), uri.as_str())
                    .await;
                None
            }
            SocketCommand::Disconnect {
                socket_descriptor, ..
            } => {
                self.registry.disconnect(socket_descriptor).await;
                None
            }
            SocketCommand::Receive { payload, .. } => {
                Some(self.router.dispatch(&self.store, payload))
            }
            // Lifecycle actions only inform subscribers.
            _ => None,
        }
    }

    /// Classifies and dispatches a raw JSON action.
    pub async fn dispatch_value(&self, raw: Value) -> Option<RouteOutcome> {
        self.dispatch(Action::from_value(raw)).await
    }

    /// Starts translating registry events into lifecycle actions.
    ///
    /// The task runs until the registry goes away or the handle is aborted.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.registry.subscribe();
        let bridge = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => bridge.on_socket_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("socket bridge lagged, {n} events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("socket event channel closed, bridge stopping");
                        break;
                    }
                }
            }
        })
    }

    async fn on_socket_event(&self, event: SocketEvent) {
        match event {
            SocketEvent::Opened {
                descriptor,
                reconnected,
            } => {
                self.dispatch(
                    SocketCommand::Connected {
                        socket_descriptor: descriptor.clone(),
                    }
                    .into(),
                )
                .await;
                if reconnected {
                    self.dispatch(
                        SocketCommand::Reconnected {
                            socket_descriptor: descriptor,
                        }
                        .into(),
                    )
                    .await;
                }
            }
            SocketEvent::Closed { descriptor, close } => {
                self.dispatch(
                    SocketCommand::Closed {
                        socket_descriptor: descriptor,
                        was_clean: close.was_clean,
                    }
                    .into(),
                )
                .await;
            }
            SocketEvent::Reconnecting { descriptor } => {
                self.dispatch(
                    SocketCommand::Reconnect {
                        socket_descriptor: descriptor,
                    }
                    .into(),
                )
                .await;
            }
            SocketEvent::Message { descriptor, text } => match InboundEvent::decode(&text) {
                Ok(payload) => {
                    self.dispatch(
                        SocketCommand::Receive {
                            socket_descriptor: descriptor,
                            payload,
                        }
                        .into(),
                    )
                    .await;
                }
                Err(e) => {
                    warn!(descriptor = %descriptor, "dropping malformed socket message: {e}");
                }
            },
        }
    }
}
