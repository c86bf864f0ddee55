//! Connection tasks and the reconnection policy.
//!
//! Contains the shared [`RegistryContext`], the per-connection task that
//! drives the pumps, and the single delayed reconnect that follows an
//! unclean close.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use statewire_protocol::constants::CLOSE_NORMAL;

use crate::heartbeat::Heartbeat;
use crate::pumps::read::{ReadContext, read_pump};
use crate::pumps::write::write_pump;
use crate::transport::Connector;
use crate::types::{CloseInfo, ReadyState, SharedReadyState, SocketConfig, SocketEvent};

/// Capacity of each connection's outbound frame queue.
const WRITE_QUEUE: usize = 256;

/// Time the write pump gets to flush the final close frame.
const CLOSE_FLUSH: Duration = Duration::from_secs(1);

/// Characters left as-is in the token query value (RFC 3986 unreserved).
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Shared state passed to the free functions that open and reopen
/// connections. Cloning is cheap: every field is a handle.
#[derive(Clone)]
pub(crate) struct RegistryContext {
    pub(crate) config: Arc<SocketConfig>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) connections: Arc<Mutex<HashMap<String, ConnectionEntry>>>,
    pub(crate) events_tx: broadcast::Sender<SocketEvent>,
    pub(crate) shutdown: CancellationToken,
}

/// Registry-side handle to one connection.
pub(crate) struct ConnectionEntry {
    pub(crate) id: Uuid,
    pub(crate) uri: String,
    pub(crate) token: String,
    pub(crate) ready: SharedReadyState,
    pub(crate) write_tx: mpsc::Sender<tungstenite::Message>,
    pub(crate) close: CancellationToken,
    task: JoinHandle<()>,
}

impl Drop for ConnectionEntry {
    fn drop(&mut self) {
        // A closing connection is left to send its close frame and publish
        // `Closed`; anything else that is replaced goes away silently.
        if self.ready.get() != ReadyState::Closing {
            self.task.abort();
        }
    }
}

/// Who asked for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectOrigin {
    Caller,
    Reconnect,
}

/// Builds `{socket_url}{uri}?token={token}`.
pub(crate) fn connection_url(socket_url: &str, uri: &str, token: &str) -> String {
    let sep = if uri.contains('?') { '&' } else { '?' };
    format!(
        "{socket_url}{uri}{sep}token={}",
        utf8_percent_encode(token, QUERY_VALUE)
    )
}

/// Opens a connection for `descriptor` unless one is already open or
/// opening. Any other entry for the descriptor is replaced.
///
/// Returns a boxed future to break the recursive type cycle with
/// [`schedule_reconnect`], which calls back into this function.
pub(crate) fn connect_inner(
    ctx: RegistryContext,
    descriptor: String,
    token: String,
    uri: String,
    origin: ConnectOrigin,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        if ctx.shutdown.is_cancelled() {
            debug!(descriptor = %descriptor, "registry shut down, not connecting");
            return;
        }

        let mut connections = ctx.connections.lock().await;
        if let Some(existing) = connections.get(&descriptor) {
            let state = existing.ready.get();
            if matches!(state, ReadyState::Open | ReadyState::Connecting) {
                debug!(descriptor = %descriptor, %state, "connection already live, ignoring connect");
                return;
            }
        }

        if origin == ConnectOrigin::Reconnect {
            info!(descriptor = %descriptor, uri = %uri, "reconnecting");
            let _ = ctx.events_tx.send(SocketEvent::Reconnecting {
                descriptor: descriptor.clone(),
            });
        } else {
            info!(descriptor = %descriptor, uri = %uri, "connecting");
        }

        let id = Uuid::new_v4();
        let ready = SharedReadyState::new(ReadyState::Connecting);
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE);
        let close = ctx.shutdown.child_token();

        let task = tokio::spawn(run_connection(
            ctx.clone(),
            ConnectionTask {
                id,
                descriptor: descriptor.clone(),
                url: connection_url(&ctx.config.socket_url, &uri, &token),
                ready: ready.clone(),
                write_tx: write_tx.clone(),
                write_rx,
                close: close.clone(),
                reconnected: origin == ConnectOrigin::Reconnect,
            },
        ));

        connections.insert(
            descriptor,
            ConnectionEntry {
                id,
                uri,
                token,
                ready,
                write_tx,
                close,
                task,
            },
        );
    })
}

/// Everything one connection task owns.
struct ConnectionTask {
    id: Uuid,
    descriptor: String,
    /// Carries the token; never logged.
    url: String,
    ready: SharedReadyState,
    write_tx: mpsc::Sender<tungstenite::Message>,
    write_rx: mpsc::Receiver<tungstenite::Message>,
    close: CancellationToken,
    reconnected: bool,
}

/// Opens the transport, runs the pumps until the connection ends, then
/// publishes the close and applies the reconnection policy.
async fn run_connection(ctx: RegistryContext, task: ConnectionTask) {
    let ConnectionTask {
        id,
        descriptor,
        url,
        ready,
        write_tx,
        write_rx,
        close,
        reconnected,
    } = task;

    let opened = tokio::select! {
        result = ctx.connector.connect(&url) => result,
        _ = close.cancelled() => {
            debug!(descriptor = %descriptor, "closed while connecting");
            finish(&ctx, &descriptor, &ready, CloseInfo::clean(CLOSE_NORMAL, ""));
            return;
        }
    };

    let (sink, stream) = match opened {
        Ok(halves) => halves,
        Err(e) => {
            warn!(descriptor = %descriptor, "failed to open connection: {e}");
            let close_info = CloseInfo::abnormal(e.to_string());
            finish(&ctx, &descriptor, &ready, close_info);
            schedule_reconnect(ctx, descriptor, id);
            return;
        }
    };

    let write_done = CancellationToken::new();
    let writer = tokio::spawn(write_pump(sink, write_rx, write_done.clone()));

    ready.set(ReadyState::Open);
    info!(descriptor = %descriptor, reconnected, "connection open");
    let _ = ctx.events_tx.send(SocketEvent::Opened {
        descriptor: descriptor.clone(),
        reconnected,
    });

    let read_ctx = ReadContext {
        descriptor: descriptor.clone(),
        write_tx,
        events_tx: ctx.events_tx.clone(),
        close,
        ready: ready.clone(),
        max_message_size: ctx.config.max_message_size,
    };
    let heartbeat = Heartbeat::start(ctx.config.ping_interval, ctx.config.pong_timeout);
    let mut close_info = read_pump(stream, &read_ctx, heartbeat).await;
    if read_ctx.close.is_cancelled() && !close_info.was_clean {
        debug!(descriptor = %descriptor, code = close_info.code, "close was requested, reporting it clean");
        close_info = CloseInfo::clean(CLOSE_NORMAL, "");
    }

    write_done.cancel();
    if tokio::time::timeout(CLOSE_FLUSH, writer).await.is_err() {
        debug!(descriptor = %descriptor, "write pump did not finish in time");
    }

    let clean = close_info.was_clean;
    finish(&ctx, &descriptor, &ready, close_info);
    if !clean {
        schedule_reconnect(ctx, descriptor, id);
    }
}

/// Marks the connection closed and publishes the close.
fn finish(ctx: &RegistryContext, descriptor: &str, ready: &SharedReadyState, close: CloseInfo) {
    ready.set(ReadyState::Closed);
    info!(
        descriptor,
        code = close.code,
        reason = %close.reason,
        clean = close.was_clean,
        "connection closed"
    );
    let _ = ctx.events_tx.send(SocketEvent::Closed {
        descriptor: descriptor.to_string(),
        close,
    });
}

/// Schedules one reconnect attempt for the connection `closed_id` after the
/// configured delay, reusing the URI and token held for the descriptor.
///
/// The attempt is dropped if the entry was replaced or removed in the
/// meantime, or if the registry shut down.
fn schedule_reconnect(ctx: RegistryContext, descriptor: String, closed_id: Uuid) {
    if ctx.shutdown.is_cancelled() {
        return;
    }
    let delay = ctx.config.reconnect_delay;
    debug!(descriptor = %descriptor, ?delay, "scheduling reconnect");

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = ctx.shutdown.cancelled() => return,
        }

        let last = {
            let connections = ctx.connections.lock().await;
            connections
                .get(&descriptor)
                .filter(|entry| entry.id == closed_id)
                .map(|entry| (entry.token.clone(), entry.uri.clone()))
        };

        match last {
            Some((token, uri)) => {
                connect_inner(ctx, descriptor, token, uri, ConnectOrigin::Reconnect).await;
            }
            None => {
                debug!(descriptor = %descriptor, "connection superseded, skipping reconnect");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_uri_and_token() {
        assert_eq!(
            connection_url("wss://host", "/chat", "abc.def-ghi_"),
            "wss://host/chat?token=abc.def-ghi_"
        );
    }

    #[test]
    fn url_encodes_token_characters() {
        assert_eq!(
            connection_url("ws://h", "/feed/", "a b&c=d"),
            "ws://h/feed/?token=a%20b%26c%3Dd"
        );
    }

    #[test]
    fn url_appends_to_existing_query() {
        assert_eq!(
            connection_url("", "ws://h/feed?room=1", "t"),
            "ws://h/feed?room=1&token=t"
        );
    }
}
