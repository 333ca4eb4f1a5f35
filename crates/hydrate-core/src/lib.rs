//! # hydrate-core
//!
//! Types shared by every hydrate crate:
//!
//! - [`SessionId`]: branded, time-ordered identifier assigned at accept time
//! - [`Clock`]: wall-clock source, swappable for a [`ManualClock`] in tests
//! - [`GatewayError`]: the gateway's error taxonomy
//! - [`ClientMessage`] / [`ServerMessage`]: inbound and outbound payloads

#![deny(unsafe_code)]

pub mod clock;
pub mod errors;
pub mod ids;
pub mod payload;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{GatewayError, Result};
pub use ids::SessionId;
pub use payload::{ClientMessage, GREETING, SenderKind, ServerMessage};
