//! Connection transport.
//!
//! The registry never talks to a socket library directly. It asks a
//! [`Connector`] for a split frame sink/stream pair, which keeps the
//! connection state machine testable against in-memory streams.

use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use statewire_protocol::constants::MAX_MESSAGE_SIZE;

use crate::error::SocketError;

/// Outbound half of an open connection.
pub type FrameSink = Pin<Box<dyn Sink<tungstenite::Message, Error = tungstenite::Error> + Send>>;

/// Inbound half of an open connection.
pub type FrameStream =
    Pin<Box<dyn Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Send>>;

/// Opens full-duplex frame streams.
pub trait Connector: Send + Sync {
    /// Opens a connection to `url`. Resolves once the handshake completed.
    fn connect<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(FrameSink, FrameStream), SocketError>> + Send + 'a>>;
}

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    max_message_size: usize,
}

impl TungsteniteConnector {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}

impl Connector for TungsteniteConnector {
    fn connect<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(FrameSink, FrameStream), SocketError>> + Send + 'a>>
    {
        Box::pin(async move {
            let mut ws_config = WebSocketConfig::default();
            ws_config.max_message_size = Some(self.max_message_size);
            ws_config.max_frame_size = Some(self.max_message_size);
            let (ws_stream, _) =
                tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
            let (write, read) = ws_stream.split();
            Ok((Box::pin(write) as FrameSink, Box::pin(read) as FrameStream))
        })
    }
}
