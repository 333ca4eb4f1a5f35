//! Ping/pong liveness tracking.

use std::time::Duration;

use tokio::time::Instant;

/// Tracks when a client was last heard from.
///
/// Any inbound frame counts as proof of life, not just pongs.
#[derive(Debug)]
pub struct Liveness {
    last_seen: Instant,
    timeout: Duration,
}

impl Liveness {
    /// Start tracking now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_seen: Instant::now(),
            timeout,
        }
    }

    /// Record activity.
    pub fn mark_alive(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Time since the last activity.
    pub fn silence(&self) -> Duration {
        self.last_seen.elapsed()
    }

    /// Whether the client has been silent for longer than the timeout.
    pub fn is_expired(&self) -> bool {
        self.silence() > self.timeout
    }
}
