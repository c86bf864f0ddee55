//! In-memory [`Connector`] for registry tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{sink, stream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::error::SocketError;
use crate::transport::{Connector, FrameSink, FrameStream};

type Inbound = Result<tungstenite::Message, tungstenite::Error>;

/// Server side of one mock connection.
#[derive(Clone)]
pub(crate) struct MockServerHandle {
    inbound: mpsc::UnboundedSender<Inbound>,
    sent: Arc<Mutex<Vec<tungstenite::Message>>>,
}

impl MockServerHandle {
    pub(crate) fn push_text(&self, text: &str) {
        let _ = self
            .inbound
            .send(Ok(tungstenite::Message::Text(text.to_string().into())));
    }

    pub(crate) fn close(&self, code: u16) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        let _ = self
            .inbound
            .send(Ok(tungstenite::Message::Close(Some(frame))));
    }

    /// Breaks the connection without a close handshake.
    pub(crate) fn fail(&self) {
        let _ = self.inbound.send(Err(tungstenite::Error::ConnectionClosed));
    }

    /// Text frames written by the client.
    pub(crate) fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                tungstenite::Message::Text(t) => Some(t.as_str().to_string()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn pings(&self) -> usize {
        self.sent_texts().iter().filter(|t| *t == "ping").count()
    }

    /// Status codes of the close frames written by the client.
    pub(crate) fn close_codes(&self) -> Vec<u16> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                tungstenite::Message::Close(Some(f)) => Some(u16::from(f.code)),
                _ => None,
            })
            .collect()
    }
}

/// Hands out in-memory connections and records every attempt.
pub(crate) struct MockConnector {
    auto_pong: bool,
    refuse: AtomicUsize,
    urls: Mutex<Vec<String>>,
    servers: Mutex<Vec<MockServerHandle>>,
}

impl MockConnector {
    /// Servers answer every probe.
    pub(crate) fn responsive() -> Arc<Self> {
        Arc::new(Self::with_auto_pong(true))
    }

    /// Servers never answer probes.
    pub(crate) fn silent() -> Arc<Self> {
        Arc::new(Self::with_auto_pong(false))
    }

    fn with_auto_pong(auto_pong: bool) -> Self {
        Self {
            auto_pong,
            refuse: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
            servers: Mutex::new(Vec::new()),
        }
    }

    /// Fails the next `n` connection attempts.
    pub(crate) fn refuse_next(&self, n: usize) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    /// Server side of the `i`-th accepted connection.
    pub(crate) fn server(&self, i: usize) -> MockServerHandle {
        self.servers.lock().unwrap()[i].clone()
    }

    fn accept(&self) -> (FrameSink, FrameStream) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Inbound>();
        let sent = Arc::new(Mutex::new(Vec::new()));
        self.servers.lock().unwrap().push(MockServerHandle {
            inbound: inbound_tx.clone(),
            sent: Arc::clone(&sent),
        });

        let read = stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });

        let auto_pong = self.auto_pong;
        let write = sink::unfold(
            (sent, inbound_tx),
            move |(sent, inbound), msg: tungstenite::Message| async move {
                let is_probe = matches!(&msg, tungstenite::Message::Text(t) if t.as_str() == "ping");
                sent.lock().unwrap().push(msg);
                if auto_pong && is_probe {
                    let _ = inbound.send(Ok(tungstenite::Message::Text("pong".into())));
                }
                Ok::<_, tungstenite::Error>((sent, inbound))
            },
        );

        (Box::pin(write) as FrameSink, Box::pin(read) as FrameStream)
    }
}

impl Connector for MockConnector {
    fn connect<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(FrameSink, FrameStream), SocketError>> + Send + 'a>>
    {
        Box::pin(async move {
            self.urls.lock().unwrap().push(url.to_string());
            let refused = self
                .refuse
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(SocketError::Ws(tungstenite::Error::ConnectionClosed));
            }
            Ok(self.accept())
        })
    }
}
