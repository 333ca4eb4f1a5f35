//! Even-minute hydration reminder broadcast.
//!
//! One global tick loop decides whether the current minute qualifies and
//! fans the reminder out to a registry snapshot. [`LastFired`] is the single
//! source of truth for "this minute already went out", so tick jitter can
//! neither double-send nor skip a qualifying minute as long as at least one
//! tick lands inside it. Schedulers handed out by the same server share one
//! [`LastFired`], so running several of them still fires each minute once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use hydrate_core::{Clock, ServerMessage};
use metrics::counter;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::{BROADCAST_DROPS_TOTAL, BROADCASTS_TOTAL};
use crate::registry::SessionRegistry;

/// A local wall-clock minute.
///
/// Keyed on local date and time. Minutes only ever fire in increasing order,
/// so when clocks fall back the repeated hour's even minutes are skipped:
/// reminders are at-most-once per wall-clock minute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MinuteKey {
    date: NaiveDate,
    hour: u32,
    minute: u32,
}

impl MinuteKey {
    /// The minute containing `at`.
    pub fn of(at: &NaiveDateTime) -> Self {
        Self {
            date: at.date(),
            hour: at.hour(),
            minute: at.minute(),
        }
    }

    /// Whether this minute gets a reminder.
    pub fn is_even(&self) -> bool {
        self.minute % 2 == 0
    }
}

/// The last minute a reminder went out for.
///
/// Cloning shares the guard.
#[derive(Clone, Debug, Default)]
pub struct LastFired(Arc<Mutex<Option<MinuteKey>>>);

impl LastFired {
    /// A guard that has never fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last minute claimed.
    pub fn get(&self) -> Option<MinuteKey> {
        *self.0.lock()
    }

    /// Mark `key` fired. False if it, or any later minute, already was.
    fn claim(&self, key: MinuteKey) -> bool {
        let mut last = self.0.lock();
        if last.is_some_and(|fired| fired >= key) {
            return false;
        }
        *last = Some(key);
        true
    }
}

/// What a single tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Odd minute.
    Idle,
    /// Even minute that has already been broadcast, or is earlier than one
    /// that has.
    AlreadyFired,
    /// Broadcast went out.
    Fired {
        /// Sessions in the snapshot.
        recipients: usize,
        /// Sessions the reminder was queued for.
        delivered: usize,
        /// Sessions that were gone or saturated.
        failed: usize,
    },
}

/// The global tick.
pub struct BroadcastScheduler {
    registry: Arc<SessionRegistry>,
    clock: Arc<dyn Clock>,
    last_fired: LastFired,
}

impl BroadcastScheduler {
    /// Scheduler with a guard of its own that has never fired.
    pub fn new(registry: Arc<SessionRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self::with_guard(registry, clock, LastFired::new())
    }

    /// Scheduler that fires only minutes `last_fired` has not seen.
    pub fn with_guard(
        registry: Arc<SessionRegistry>,
        clock: Arc<dyn Clock>,
        last_fired: LastFired,
    ) -> Self {
        Self {
            registry,
            clock,
            last_fired,
        }
    }

    /// The last minute a reminder went out for.
    pub fn last_fired(&self) -> Option<MinuteKey> {
        self.last_fired.get()
    }

    /// Evaluate the current time once and broadcast if the minute qualifies.
    ///
    /// A failed delivery never stops the fan-out and never touches the
    /// registry: the session's own handler notices the dead transport and
    /// unregisters it.
    pub fn tick(&self) -> TickOutcome {
        let now = self.clock.now();
        let key = MinuteKey::of(&now);
        if !key.is_even() {
            return TickOutcome::Idle;
        }
        if !self.last_fired.claim(key) {
            return TickOutcome::AlreadyFired;
        }

        let payload: Arc<str> = match ServerMessage::hydration_reminder(now).to_json() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                error!(error = %e, "failed to serialize hydration reminder");
                return TickOutcome::Idle;
            }
        };

        let sessions = self.registry.snapshot();
        let recipients = sessions.len();
        let mut delivered = 0;
        let mut failed = 0;
        for session in &sessions {
            match session.deliver(Arc::clone(&payload)) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    counter!(BROADCAST_DROPS_TOTAL, "reason" => e.error_kind()).increment(1);
                    if e.is_disconnect() {
                        debug!(session_id = %session.id(), "session gone, reminder not delivered");
                    } else {
                        warn!(session_id = %session.id(), error = %e, "reminder dropped");
                    }
                }
            }
        }

        counter!(BROADCASTS_TOTAL).increment(1);
        info!(
            minute = %now.format("%H:%M"),
            recipients,
            delivered,
            failed,
            "hydration reminder broadcast"
        );
        TickOutcome::Fired {
            recipients,
            delivered,
            failed,
        }
    }

    /// Tick every `interval` until `cancel` fires.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = interval.as_millis(), "broadcast scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.tick();
                }
                () = cancel.cancelled() => {
                    info!("broadcast scheduler stopped");
                    break;
                }
            }
        }
    }

    /// Spawn [`Self::run`] onto the runtime.
    pub fn spawn(self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(interval, cancel))
    }
}
