//! `WebSocket` transport, connection lifecycle and liveness tracking.

pub mod connection;
pub mod heartbeat;
pub mod transport;

pub use connection::{CloseReason, ConnectionHandler, ConnectionOptions, ConnectionState, ConnectionSummary};
pub use transport::{Frame, MemoryPeer, MemoryTransport, Outbound, Transport, WsTransport, memory_pair};
