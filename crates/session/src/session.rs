//! Session assembly.
//!
//! A [`Session`] owns one state store, one connection registry with its
//! bridge, and one request orchestrator, built from any number of
//! [`StateModule`]s.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use statewire_api::{
    ApiError, HttpTransport, InvocationOutcome, OperationHandle, Payload, ReqwestTransport,
    RequestOrchestrator,
};
use statewire_protocol::{Action, EventKey, SocketActionFactory, SocketCommand};
use statewire_socket::{
    ConnectionRegistry, Connector, EventHandler, EventRouter, ReadyState, RouteOutcome,
    SocketBridge, SocketError, TungsteniteConnector,
};
use statewire_store::{Store, Tracked};

use crate::config::{ConfigError, SessionConfig};
use crate::module::StateModule;

/// Errors produced by session assembly and session calls.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("module {0} is already registered")]
    DuplicateModule(String),

    #[error("no local event registered for {0}")]
    UnknownLocalEvent(EventKey),
}

/// Collects modules and collaborators for a [`Session`].
pub struct SessionBuilder<S> {
    config: SessionConfig,
    initial: S,
    modules: Vec<StateModule<S>>,
    connector: Option<Arc<dyn Connector>>,
    transport: Option<Arc<dyn HttpTransport>>,
    token: Option<Arc<dyn Fn(&S) -> Option<String> + Send + Sync>>,
    selectors: Vec<(String, Arc<dyn Fn(&S) -> Value + Send + Sync>)>,
}

impl<S> SessionBuilder<S>
where
    S: Tracked + Clone + Send + Sync + 'static,
{
    pub fn new(config: SessionConfig, initial: S) -> Self {
        Self {
            config,
            initial,
            modules: Vec::new(),
            connector: None,
            transport: None,
            token: None,
            selectors: Vec::new(),
        }
    }

    pub fn module(mut self, module: StateModule<S>) -> Self {
        self.modules.push(module);
        self
    }

    /// Replaces the default `tokio-tungstenite` connector.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replaces the default `reqwest` transport.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Selects the auth token sent with every operation.
    pub fn token_selector<F>(mut self, selector: F) -> Self
    where
        F: Fn(&S) -> Option<String> + Send + Sync + 'static,
    {
        self.token = Some(Arc::new(selector));
        self
    }

    /// Adds a contextual value merged into every operation payload.
    pub fn selector<F>(mut self, name: impl Into<String>, selector: F) -> Self
    where
        F: Fn(&S) -> Value + Send + Sync + 'static,
    {
        self.selectors.push((name.into(), Arc::new(selector)));
        self
    }

    /// Validates the configuration, wires every module and starts the
    /// socket bridge. Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Session<S>, SessionError> {
        self.config.validate()?;

        let store = Store::new(self.initial);
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::default()));
        let mut orchestrator =
            RequestOrchestrator::new(self.config.api_url.clone(), store.clone(), transport)
                .with_auth_scheme(self.config.auth_scheme.clone());
        if let Some(token) = self.token {
            orchestrator = orchestrator.with_token_selector(move |s: &S| token(s));
        }
        for (name, select) in self.selectors {
            orchestrator = orchestrator.with_selector(name, move |s: &S| select(s));
        }

        let mut router = EventRouter::new();
        let mut local: HashMap<EventKey, EventHandler<S>> = HashMap::new();
        let mut namespaces = HashSet::new();

        for module in self.modules {
            if !namespaces.insert(module.namespace().to_string()) {
                return Err(SessionError::DuplicateModule(module.namespace().to_string()));
            }
            let namespace = module.namespace().to_string();
            for (event, handler) in module.listeners {
                router.register(EventKey::new(namespace.as_str(), event), move |s: &mut S, data: &Value| {
                    handler(s, data)
                });
            }
            for (event, handler) in module.local_events {
                local.insert(EventKey::new(namespace.as_str(), event), handler);
            }
            for operation in module.operations {
                orchestrator.register(operation)?;
            }
            debug!(namespace = %namespace, "state module registered");
        }

        let socket_config = self.config.socket_config();
        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(TungsteniteConnector::new(socket_config.max_message_size))
        });
        let registry = ConnectionRegistry::new(socket_config, connector)?;

        let bridge = Arc::new(SocketBridge::new(Arc::new(registry), router, store.clone()));
        let bridge_task = bridge.start();

        info!(
            modules = namespaces.len(),
            events = bridge.router().len(),
            "session started"
        );

        Ok(Session {
            store,
            bridge,
            orchestrator: Arc::new(orchestrator),
            local,
            bridge_task,
        })
    }
}

/// One real-time session: sockets, routed events and tracked operations
/// over a shared state store.
pub struct Session<S> {
    store: Store<S>,
    bridge: Arc<SocketBridge<S>>,
    orchestrator: Arc<RequestOrchestrator<S>>,
    local: HashMap<EventKey, EventHandler<S>>,
    bridge_task: JoinHandle<()>,
}

impl<S> Session<S>
where
    S: Tracked + Clone + Send + Sync + 'static,
{
    pub fn builder(config: SessionConfig, initial: S) -> SessionBuilder<S> {
        SessionBuilder::new(config, initial)
    }

    pub fn store(&self) -> &Store<S> {
        &self.store
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> Arc<S> {
        self.store.snapshot()
    }

    /// Subscribes to every action: dispatched commands, lifecycle actions
    /// and received events.
    pub fn subscribe_actions(&self) -> broadcast::Receiver<Action> {
        self.bridge.subscribe()
    }

    /// Dispatches an action through the socket bridge.
    pub async fn dispatch(&self, action: Action) -> Option<RouteOutcome> {
        self.bridge.dispatch(action).await
    }

    /// Dispatches a raw JSON action.
    pub async fn dispatch_value(&self, raw: Value) -> Option<RouteOutcome> {
        self.bridge.dispatch_value(raw).await
    }

    /// Connects `uri` under `descriptor`; a no-op while it is already open.
    pub async fn connect(&self, descriptor: &str, token: &str, uri: &str) {
        self.dispatch(
            SocketCommand::Connect {
                socket_descriptor: descriptor.to_string(),
                token: token.to_string(),
                uri: uri.to_string(),
            }
            .into(),
        )
        .await;
    }

    /// Connects through a prepared action factory.
    pub async fn connect_with(&self, factory: &SocketActionFactory, token: &str, session_id: Option<&str>) {
        self.dispatch(factory.connect(token, session_id).into()).await;
    }

    /// Closes the descriptor's connection normally.
    pub async fn disconnect(&self, descriptor: &str) {
        self.dispatch(
            SocketCommand::Disconnect {
                socket_descriptor: descriptor.to_string(),
                token: String::new(),
                uri: String::new(),
            }
            .into(),
        )
        .await;
    }

    /// Readiness of the descriptor's connection, `None` if unknown.
    pub async fn socket_state(&self, descriptor: &str) -> Option<ReadyState> {
        self.bridge.registry().state(descriptor).await
    }

    /// Sends a text frame on an open connection.
    pub async fn send(&self, descriptor: &str, text: impl Into<String>) -> Result<(), SessionError> {
        Ok(self.bridge.registry().send(descriptor, text).await?)
    }

    /// Invokes a registered operation and waits for its outcome.
    pub async fn invoke(&self, operation: &str, payload: Payload) -> Result<InvocationOutcome, SessionError> {
        Ok(self.orchestrator.invoke(operation, payload).await?)
    }

    /// Invokes a registered operation on a background task.
    pub fn spawn_invoke(
        &self,
        operation: impl Into<String>,
        payload: Payload,
    ) -> JoinHandle<Result<InvocationOutcome, ApiError>> {
        self.orchestrator.spawn_invoke(operation, payload)
    }

    pub fn operation(&self, name: &str) -> Option<OperationHandle> {
        self.orchestrator.handle(name)
    }

    /// Applies the local event `{namespace}.{event}` to the state.
    pub fn emit_local(&self, namespace: &str, event: &str, payload: &Value) -> Result<(), SessionError> {
        let key = EventKey::new(namespace, event);
        let handler = self.local.get(&key).ok_or_else(|| {
            warn!(event = %key, "no local event registered");
            SessionError::UnknownLocalEvent(key.clone())
        })?;
        debug!(event = %key, "applying local event");
        self.store.update(|state| handler(state, payload));
        Ok(())
    }

    /// Closes every connection and stops the bridge task. Lifecycle actions
    /// for connections still closing are not published afterwards.
    pub fn shutdown(&self) {
        self.bridge.registry().shutdown();
        self.bridge_task.abort();
    }
}

impl<S> Drop for Session<S> {
    fn drop(&mut self) {
        self.bridge_task.abort();
    }
}
