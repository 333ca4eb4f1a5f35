//! # hydrate-server
//!
//! Axum HTTP + `WebSocket` chat gateway.
//!
//! - [`registry`]: the process-wide set of live sessions, the only shared
//!   mutable state in the gateway
//! - [`websocket`]: transport abstraction and the per-connection handler
//!   (accept, receive loop, reply, teardown)
//! - [`scheduler`]: the single global tick that pushes the even-minute
//!   hydration reminder to a snapshot of live sessions
//! - HTTP endpoints: chat page, health check, Prometheus metrics
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use registry::{Session, SessionRegistry};
pub use scheduler::{BroadcastScheduler, LastFired, TickOutcome};
pub use server::{GatewayServer, ServerHandle};
