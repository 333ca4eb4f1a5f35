//! Per-connection lifecycle, from accept through teardown.
//!
//! A [`ConnectionHandler`] exclusively owns one [`Transport`]. It registers a
//! fresh session, greets the client, then runs a single select loop over the
//! transport, the session's outbound queue, the heartbeat timer and the
//! server shutdown token. Every exit path funnels into one teardown, so
//! unregister runs exactly once per connection.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hydrate_core::{ClientMessage, Clock, GatewayError, ServerMessage, SessionId};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::heartbeat::Liveness;
use super::transport::{Frame, Outbound, Transport};
use crate::config::ServerConfig;
use crate::metrics::{
    CONNECTION_DURATION_SECONDS, MESSAGES_RECEIVED_TOTAL, PROTOCOL_ERRORS_TOTAL,
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};
use crate::registry::{Session, SessionRegistry};

/// Where a connection is in its lifecycle. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, not yet registered.
    Connecting,
    /// Registered and greeted; receiving.
    Open,
    /// Tearing down.
    Closing,
    /// Unregistered and released.
    Closed,
}

/// Why a connection left the `Open` state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed, the stream ended or errored.
    ClientClosed,
    /// A write to the transport failed.
    SendFailed,
    /// Nothing heard from the client within the heartbeat timeout.
    HeartbeatTimeout,
    /// The server is shutting down.
    Shutdown,
    /// The generated id was already registered.
    DuplicateId,
}

impl CloseReason {
    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::SendFailed => "send_failed",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Shutdown => "shutdown",
            Self::DuplicateId => "duplicate_id",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knobs for a single connection.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionOptions {
    /// Capacity of the outbound broadcast queue.
    pub send_queue_capacity: usize,
    /// Interval between pings.
    pub heartbeat_interval: Duration,
    /// Silence after which the client is considered gone.
    pub heartbeat_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for ConnectionOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            send_queue_capacity: config.send_queue_capacity,
            heartbeat_interval: config.heartbeat_interval,
            heartbeat_timeout: config.heartbeat_timeout,
        }
    }
}

/// What happened over a connection's lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionSummary {
    /// The session id the connection ran under.
    pub session_id: SessionId,
    /// Why it closed.
    pub reason: CloseReason,
    /// Well-formed chat messages received.
    pub messages_received: u64,
    /// Replies written back.
    pub replies_sent: u64,
    /// Malformed payloads dropped.
    pub protocol_errors: u64,
    /// Always [`ConnectionState::Closed`] once `run` returns.
    pub final_state: ConnectionState,
}

#[derive(Default)]
struct Counts {
    messages_received: u64,
    replies_sent: u64,
    protocol_errors: u64,
}

/// Drives one client connection.
pub struct ConnectionHandler<T: Transport> {
    transport: T,
    registry: Arc<SessionRegistry>,
    clock: Arc<dyn Clock>,
    options: ConnectionOptions,
    shutdown: CancellationToken,
    session_id: SessionId,
    state: ConnectionState,
}

impl<T: Transport> ConnectionHandler<T> {
    /// New handler in the `Connecting` state with a freshly generated id.
    pub fn new(
        transport: T,
        registry: Arc<SessionRegistry>,
        clock: Arc<dyn Clock>,
        options: ConnectionOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            transport,
            registry,
            clock,
            options,
            shutdown,
            session_id: SessionId::new(),
            state: ConnectionState::Connecting,
        }
    }

    /// Run under a caller-chosen id instead of a generated one.
    #[must_use]
    pub fn with_session_id(mut self, id: SessionId) -> Self {
        self.session_id = id;
        self
    }

    /// The id this connection registers under.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, to: ConnectionState) {
        debug!(from = ?self.state, to = ?to, "connection state");
        self.state = to;
    }

    /// Run the connection to completion.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    pub async fn run(mut self) -> ConnectionSummary {
        let (outbound, outbound_rx) = Outbound::channel(self.options.send_queue_capacity);
        let session = Session::new(self.session_id.clone(), self.clock.now(), &outbound);

        if let Err(e) = self.registry.register(session) {
            warn!(error = %e, "session id collision, closing connection");
            self.transition(ConnectionState::Closing);
            self.transport.close().await;
            self.transition(ConnectionState::Closed);
            return self.summary(CloseReason::DuplicateId, &Counts::default());
        }

        self.transition(ConnectionState::Open);
        let started = std::time::Instant::now();
        info!(connections = self.registry.len(), "client connected");
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

        let mut counts = Counts::default();
        let reason = match self.greet().await {
            Ok(()) => self.serve(outbound_rx, &mut counts).await,
            Err(e) => {
                debug!(error = %e, "greeting not delivered");
                CloseReason::SendFailed
            }
        };

        self.teardown(outbound, reason).await;
        info!(
            reason = %reason,
            messages = counts.messages_received,
            "client disconnected"
        );
        counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        self.summary(reason, &counts)
    }

    async fn greet(&mut self) -> Result<(), GatewayError> {
        let json = ServerMessage::greeting()
            .to_json()
            .map_err(|e| GatewayError::Protocol(e.to_string()))?;
        self.transport.send(&json).await
    }

    async fn serve(
        &mut self,
        mut outbound_rx: mpsc::Receiver<Arc<str>>,
        counts: &mut Counts,
    ) -> CloseReason {
        let interval = self.options.heartbeat_interval;
        let mut heartbeat = time::interval_at(Instant::now() + interval, interval);
        let mut liveness = Liveness::new(self.options.heartbeat_timeout);
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => return CloseReason::Shutdown,

                frame = self.transport.receive() => {
                    liveness.mark_alive();
                    match frame {
                        Frame::Closed => return CloseReason::ClientClosed,
                        Frame::Heartbeat => {}
                        Frame::Text(raw) => match self.on_text(&raw, counts).await {
                            Ok(()) => {}
                            Err(e) if e.is_recoverable() => {
                                counts.protocol_errors += 1;
                                counter!(PROTOCOL_ERRORS_TOTAL).increment(1);
                                warn!(error = %e, len = raw.len(), "dropping malformed message");
                            }
                            Err(e) => {
                                debug!(error = %e, "reply not delivered");
                                return CloseReason::SendFailed;
                            }
                        },
                    }
                }

                Some(text) = outbound_rx.recv() => {
                    if let Err(e) = self.transport.send(&text).await {
                        debug!(error = %e, "broadcast not delivered");
                        return CloseReason::SendFailed;
                    }
                }

                _ = heartbeat.tick() => {
                    if liveness.is_expired() {
                        warn!(silence_secs = liveness.silence().as_secs(), "client unresponsive, disconnecting");
                        return CloseReason::HeartbeatTimeout;
                    }
                    if self.transport.ping().await.is_err() {
                        return CloseReason::SendFailed;
                    }
                }
            }
        }
    }

    /// Handle one inbound text payload.
    ///
    /// Any text frame counts as activity, well-formed or not. A malformed
    /// payload comes back as a recoverable [`GatewayError::Protocol`]; a failed
    /// write as a disconnect.
    async fn on_text(&mut self, raw: &str, counts: &mut Counts) -> Result<(), GatewayError> {
        self.registry.touch(&self.session_id);
        match ClientMessage::parse(raw)? {
            ClientMessage::Chat(text) => {
                counts.messages_received += 1;
                counter!(MESSAGES_RECEIVED_TOTAL).increment(1);
                let reply = ServerMessage::reply(&text, self.clock.now())
                    .to_json()
                    .map_err(|e| GatewayError::Protocol(e.to_string()))?;
                self.transport.send(&reply).await?;
                counts.replies_sent += 1;
                debug!("reply sent");
            }
        }
        Ok(())
    }

    async fn teardown(&mut self, outbound: Arc<Outbound>, reason: CloseReason) {
        self.transition(ConnectionState::Closing);
        let _ = self.registry.unregister(&self.session_id);
        drop(outbound);
        if matches!(reason, CloseReason::Shutdown | CloseReason::HeartbeatTimeout) {
            self.transport.close().await;
        }
        self.transition(ConnectionState::Closed);
    }

    fn summary(&self, reason: CloseReason, counts: &Counts) -> ConnectionSummary {
        ConnectionSummary {
            session_id: self.session_id.clone(),
            reason,
            messages_received: counts.messages_received,
            replies_sent: counts.replies_sent,
            protocol_errors: counts.protocol_errors,
            final_state: self.state,
        }
    }
}
