//! WebSocket read pump: dispatches inbound frames and supervises liveness.

use futures_util::{Stream, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use statewire_protocol::constants::{
    CLOSE_NORMAL, CLOSE_PING_TIMEOUT, PING, PING_TIMEOUT_REASON, is_liveness_reply,
};

use crate::heartbeat::Heartbeat;
use crate::types::{CloseInfo, ReadyState, SharedReadyState, SocketEvent};

/// Everything the read pump needs besides the stream itself.
pub(crate) struct ReadContext {
    pub(crate) descriptor: String,
    pub(crate) write_tx: mpsc::Sender<tungstenite::Message>,
    pub(crate) events_tx: broadcast::Sender<SocketEvent>,
    /// Cancelled by `disconnect`: close normally.
    pub(crate) close: CancellationToken,
    pub(crate) ready: SharedReadyState,
    pub(crate) max_message_size: usize,
}

/// Reads frames until the connection ends and reports how it ended.
///
/// Liveness replies go to the heartbeat; other text frames are published as
/// [`SocketEvent::Message`]. A missed reply closes the connection with
/// code 4008, which is reported as unclean.
pub(crate) async fn read_pump<S>(mut read: S, ctx: &ReadContext, mut heartbeat: Heartbeat) -> CloseInfo
where
    S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let descriptor = ctx.descriptor.as_str();

    loop {
        tokio::select! {
            // A requested close wins over anything the stream has ready.
            biased;

            _ = ctx.close.cancelled() => {
                debug!(descriptor, "closing on request");
                ctx.ready.set(ReadyState::Closing);
                send_close(&ctx.write_tx, CLOSE_NORMAL, "").await;
                return CloseInfo::clean(CLOSE_NORMAL, "");
            }

            _ = heartbeat.interval.tick() => {
                trace!(descriptor, "sending liveness probe");
                let probe = tungstenite::Message::Text(tungstenite::Utf8Bytes::from_static(PING));
                if ctx.write_tx.send(probe).await.is_err() {
                    return CloseInfo::abnormal("write pump stopped");
                }
                heartbeat.arm();
            }

            () = Heartbeat::expired(&mut heartbeat.deadline) => {
                warn!(descriptor, "liveness reply missed, closing connection");
                ctx.ready.set(ReadyState::Closing);
                send_close(&ctx.write_tx, CLOSE_PING_TIMEOUT, PING_TIMEOUT_REASON).await;
                return CloseInfo::ping_timeout();
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if is_liveness_reply(text.as_str()) {
                            trace!(descriptor, "received liveness reply");
                            heartbeat.on_reply();
                            continue;
                        }
                        if text.len() > ctx.max_message_size {
                            warn!(descriptor, "message too large ({} bytes), dropping", text.len());
                            continue;
                        }
                        let _ = ctx.events_tx.send(SocketEvent::Message {
                            descriptor: descriptor.to_string(),
                            text: text.as_str().to_string(),
                        });
                    }
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        trace!(descriptor, "received ping, sending pong");
                        let _ = ctx.write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        let close = match frame {
                            Some(f) => CloseInfo::from_server(Some(u16::from(f.code)), f.reason.as_str()),
                            None => CloseInfo::from_server(None, ""),
                        };
                        debug!(descriptor, code = close.code, clean = close.was_clean, "received close frame");
                        return close;
                    }
                    Some(Ok(_)) => {} // Binary and pong frames carry nothing for us.
                    Some(Err(e)) => {
                        warn!(descriptor, "WebSocket read error: {e}");
                        return CloseInfo::abnormal(e.to_string());
                    }
                    None => {
                        debug!(descriptor, "WebSocket stream ended");
                        return CloseInfo::abnormal("stream ended");
                    }
                }
            }
        }
    }
}

/// Queues a close frame for the write pump.
async fn send_close(write_tx: &mpsc::Sender<tungstenite::Message>, code: u16, reason: &str) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_string().into(),
    };
    let _ = write_tx.send(tungstenite::Message::Close(Some(frame))).await;
}
