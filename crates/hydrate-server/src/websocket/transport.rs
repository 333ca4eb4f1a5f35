//! Send/receive primitives a connection exposes to the rest of the gateway.
//!
//! A [`Transport`] is exclusively owned by its connection handler. Other
//! components never touch it; they push into the connection's [`Outbound`]
//! queue instead, and the handler drains that queue onto the transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use hydrate_core::{GatewayError, Result, ServerMessage};
use tokio::sync::mpsc;
use tracing::debug;

/// What a transport yields from [`Transport::receive`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A text payload.
    Text(String),
    /// A ping or pong: proof of life with no payload.
    Heartbeat,
    /// The peer is gone (close frame, stream end or network error).
    Closed,
}

/// A persistent, bidirectional text channel to one client.
#[async_trait]
pub trait Transport: Send {
    /// Send one text payload. Fails with [`GatewayError::TransportClosed`]
    /// once the peer is gone.
    async fn send(&mut self, text: &str) -> Result<()>;

    /// Wait for the next frame. Resolves to [`Frame::Closed`] as soon as the
    /// connection is closed. Must be cancel-safe.
    async fn receive(&mut self) -> Frame;

    /// Send a liveness ping.
    async fn ping(&mut self) -> Result<()> {
        Ok(())
    }

    /// Close from our side. Best effort.
    async fn close(&mut self) {}
}

// ── Outbound queue ──────────────────────────────────────────────────────────

/// Bounded queue of text payloads waiting to be written to one connection.
///
/// The connection handler holds the only strong reference; the registry holds
/// a `Weak`, so nothing outside the handler can keep a dead connection's
/// queue alive.
pub struct Outbound {
    tx: mpsc::Sender<Arc<str>>,
    dropped: AtomicU64,
}

impl Outbound {
    /// Create a queue and the receiver the handler drains.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let outbound = Arc::new(Self {
            tx,
            dropped: AtomicU64::new(0),
        });
        (outbound, rx)
    }

    /// Enqueue without waiting.
    pub fn push(&self, text: Arc<str>) -> Result<()> {
        match self.tx.try_send(text) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(GatewayError::SendQueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(GatewayError::TransportClosed),
        }
    }

    /// Messages dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ── WebSocket ───────────────────────────────────────────────────────────────

/// [`Transport`] over an upgraded axum `WebSocket`.
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    /// Wrap an upgraded socket.
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: &str) -> Result<()> {
        self.socket
            .send(Message::Text(text.to_owned().into()))
            .await
            .map_err(|_| GatewayError::TransportClosed)
    }

    async fn receive(&mut self) -> Frame {
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Text(text))) => return Frame::Text(text.to_string()),
                // Some clients send JSON as binary frames.
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => return Frame::Text(text.to_owned()),
                    Err(_) => debug!(len = data.len(), "skipping non-UTF8 binary frame"),
                },
                // axum answers pings itself
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => return Frame::Heartbeat,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return Frame::Closed,
            }
        }
    }

    async fn ping(&mut self) -> Result<()> {
        self.socket
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|_| GatewayError::TransportClosed)
    }

    async fn close(&mut self) {
        let _ = self.socket.send(Message::Close(None)).await;
    }
}

// ── In-memory ───────────────────────────────────────────────────────────────

/// [`Transport`] backed by in-process channels. The other end is a
/// [`MemoryPeer`].
pub struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<Frame>,
    outbound: mpsc::UnboundedSender<String>,
    pings: Arc<AtomicU64>,
}

/// Client side of a [`MemoryTransport`].
pub struct MemoryPeer {
    tx: mpsc::UnboundedSender<Frame>,
    rx: mpsc::UnboundedReceiver<String>,
    pings: Arc<AtomicU64>,
}

/// Create a connected transport/peer pair.
pub fn memory_pair() -> (MemoryTransport, MemoryPeer) {
    let (to_server, inbound) = mpsc::unbounded_channel();
    let (outbound, from_server) = mpsc::unbounded_channel();
    let pings = Arc::new(AtomicU64::new(0));
    (
        MemoryTransport {
            inbound,
            outbound,
            pings: Arc::clone(&pings),
        },
        MemoryPeer {
            tx: to_server,
            rx: from_server,
            pings,
        },
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, text: &str) -> Result<()> {
        self.outbound
            .send(text.to_owned())
            .map_err(|_| GatewayError::TransportClosed)
    }

    async fn receive(&mut self) -> Frame {
        self.inbound.recv().await.unwrap_or(Frame::Closed)
    }

    async fn ping(&mut self) -> Result<()> {
        if self.outbound.is_closed() {
            return Err(GatewayError::TransportClosed);
        }
        let _ = self.pings.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

impl MemoryPeer {
    /// Send a raw text frame to the server. Returns `false` once the server
    /// side is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.tx.send(Frame::Text(text.into())).is_ok()
    }

    /// Send a `{"text": ...}` chat payload.
    pub fn send_chat(&self, text: &str) -> bool {
        self.send_text(serde_json::json!({ "text": text }).to_string())
    }

    /// Answer a ping.
    pub fn heartbeat(&self) -> bool {
        self.tx.send(Frame::Heartbeat).is_ok()
    }

    /// Signal a client-initiated close.
    pub fn close(&self) {
        let _ = self.tx.send(Frame::Closed);
    }

    /// Next raw payload from the server; `None` once the server side is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Next payload decoded as a [`ServerMessage`].
    pub async fn recv_message(&mut self) -> Option<ServerMessage> {
        let raw = self.recv().await?;
        serde_json::from_str(&raw).ok()
    }

    /// A payload that is already waiting, if any.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Number of pings the server has sent.
    pub fn pings(&self) -> u64 {
        self.pings.load(Ordering::Relaxed)
    }
}
