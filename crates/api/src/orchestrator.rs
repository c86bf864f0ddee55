//! Request orchestrator: runs declared operations and tracks their status.
//!
//! Every invocation goes through exactly one `started` transition and
//! exactly one terminal transition (`done` or `failed`), both recorded in
//! the state's [`LoadingTable`](statewire_store::LoadingTable).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use statewire_store::{Store, Tracked};

use crate::error::ApiError;
use crate::operation::{Method, Operation, Payload, RequestKind};
use crate::path::{query_string, request_url, value_text};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, RequestBody};

/// Default `Authorization` scheme.
pub const DEFAULT_AUTH_SCHEME: &str = "JWT";

/// Reads the auth token from the state.
pub type TokenSelector<S> = Arc<dyn Fn(&S) -> Option<String> + Send + Sync>;

/// Reads a contextual request value from the state.
pub type ValueSelector<S> = Arc<dyn Fn(&S) -> Value + Send + Sync>;

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    /// 2xx response.
    Done { status: u16, result: Value },
    /// Non-2xx response (`status` set) or a failure before any response.
    Failed { status: Option<u16>, error: Value },
}

impl InvocationOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// Handle returned by [`RequestOrchestrator::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    name: String,
}

impl OperationHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the operation is in flight in `state`.
    pub fn is_loading<S: Tracked>(&self, state: &S) -> bool {
        state.loading().is_loading(&self.name)
    }
}

pub struct RequestOrchestrator<S> {
    api_url: String,
    auth_scheme: String,
    store: Store<S>,
    transport: Arc<dyn HttpTransport>,
    token: Option<TokenSelector<S>>,
    selectors: Vec<(String, ValueSelector<S>)>,
    operations: HashMap<String, Arc<Operation<S>>>,
}

impl<S> fmt::Debug for RequestOrchestrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOrchestrator")
            .field("api_url", &self.api_url)
            .field("auth_scheme", &self.auth_scheme)
            .field("operations", &self.operations.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<S> RequestOrchestrator<S>
where
    S: Tracked + Clone + Send + Sync + 'static,
{
    pub fn new(api_url: impl Into<String>, store: Store<S>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            api_url: api_url.into(),
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
            store,
            transport,
            token: None,
            selectors: Vec::new(),
            operations: HashMap::new(),
        }
    }

    pub fn with_auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = scheme.into();
        self
    }

    /// Sets the selector for the `Authorization` token. An empty or missing
    /// token sends no header.
    pub fn with_token_selector<F>(mut self, selector: F) -> Self
    where
        F: Fn(&S) -> Option<String> + Send + Sync + 'static,
    {
        self.token = Some(Arc::new(selector));
        self
    }

    /// Adds a contextual value merged into every payload under `name`.
    /// Keys present in the invocation payload take precedence.
    pub fn with_selector<F>(mut self, name: impl Into<String>, selector: F) -> Self
    where
        F: Fn(&S) -> Value + Send + Sync + 'static,
    {
        self.selectors.push((name.into(), Arc::new(selector)));
        self
    }

    pub fn store(&self) -> &Store<S> {
        &self.store
    }

    /// Registers an operation. Names are unique.
    pub fn register(&mut self, operation: Operation<S>) -> Result<OperationHandle, ApiError> {
        let name = operation.name.clone();
        if self.operations.contains_key(&name) {
            return Err(ApiError::DuplicateOperation(name));
        }
        debug!(operation = %name, method = %operation.method, path = %operation.path, "operation registered");
        self.operations.insert(name.clone(), Arc::new(operation));
        Ok(OperationHandle { name })
    }

    pub fn handle(&self, name: &str) -> Option<OperationHandle> {
        self.operations.contains_key(name).then(|| OperationHandle {
            name: name.to_string(),
        })
    }

    pub fn operation_names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// Runs the named operation to completion.
    ///
    /// Fails only for an unknown name, in which case no transition happens.
    /// Everything else, including transport errors, ends in a `failed`
    /// transition and is reported as [`InvocationOutcome::Failed`].
    pub async fn invoke(&self, name: &str, payload: Payload) -> Result<InvocationOutcome, ApiError> {
        let operation = self
            .operations
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::UnknownOperation(name.to_string()))?;

        self.store.update(|state| {
            state.loading_mut().start(name);
            if let Some(on_start) = &operation.on_start {
                on_start(state, &payload);
            }
        });
        debug!(operation = %name, "operation started");

        let response = match self.build_request(&operation, &payload) {
            Ok(request) => self.transport.call(request).await.map_err(ApiError::from),
            Err(e) => Err(e),
        };

        let outcome = match response {
            Ok(response) if response.is_success() => {
                let HttpResponse { status, body } = response;
                self.store.update(|state| {
                    state.loading_mut().finish(name);
                    if let Some(on_success) = &operation.on_success {
                        on_success(state, &body, &payload);
                    }
                });
                info!(operation = %name, status, "operation done");
                InvocationOutcome::Done {
                    status,
                    result: body,
                }
            }
            Ok(HttpResponse { status, body }) => {
                warn!(operation = %name, status, "operation failed");
                self.fail(&operation, &payload, Some(status), body)
            }
            Err(e) => {
                warn!(operation = %name, "operation failed: {e}");
                self.fail(&operation, &payload, None, Value::String(e.to_string()))
            }
        };
        Ok(outcome)
    }

    /// Runs the named operation on a background task.
    pub fn spawn_invoke(
        self: &Arc<Self>,
        name: impl Into<String>,
        payload: Payload,
    ) -> JoinHandle<Result<InvocationOutcome, ApiError>> {
        let this = Arc::clone(self);
        let name = name.into();
        tokio::spawn(async move { this.invoke(&name, payload).await })
    }

    fn fail(
        &self,
        operation: &Operation<S>,
        payload: &Payload,
        status: Option<u16>,
        error: Value,
    ) -> InvocationOutcome {
        self.store.update(|state| {
            state.loading_mut().fail(&operation.name, value_text(&error));
            if let Some(on_fail) = &operation.on_fail {
                on_fail(state, &error, payload);
            }
        });
        InvocationOutcome::Failed { status, error }
    }

    /// Resolves the token and contextual values from the current snapshot
    /// and encodes the request.
    fn build_request(&self, operation: &Operation<S>, payload: &Payload) -> Result<HttpRequest, ApiError> {
        let snapshot = self.store.snapshot();
        let token = self
            .token
            .as_ref()
            .and_then(|select| select(&snapshot))
            .filter(|t| !t.is_empty());

        let mut data = Payload::new();
        for (name, select) in &self.selectors {
            data.insert(name.clone(), select(&snapshot));
        }
        for (key, value) in payload {
            data.insert(key.clone(), value.clone());
        }

        let mut url = request_url(&self.api_url, &operation.path, &mut data)?;

        let mut headers = Vec::new();
        if operation.kind == RequestKind::Json {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        if let Some(token) = token {
            headers.push((
                "Authorization".to_string(),
                format!("{} {token}", self.auth_scheme),
            ));
        }

        let body = if operation.method == Method::Get {
            let query = query_string(&data);
            if !query.is_empty() {
                url.push('?');
                url.push_str(&query);
            }
            None
        } else {
            Some(match operation.kind {
                RequestKind::Json => RequestBody::Json(Value::Object(data)),
                RequestKind::Form => RequestBody::Form(
                    data.iter()
                        .map(|(k, v)| (k.clone(), value_text(v)))
                        .collect(),
                ),
            })
        };

        Ok(HttpRequest {
            method: operation.method,
            url,
            headers,
            body,
        })
    }
}
