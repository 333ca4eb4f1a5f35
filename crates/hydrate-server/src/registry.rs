//! Session registry: the set of live connections.
//!
//! This is the single shared mutable structure in the gateway. Connection
//! handlers insert, touch and remove their own session; the broadcast
//! scheduler only ever reads a [`SessionRegistry::snapshot`].

use std::sync::{Arc, Weak};

use chrono::NaiveDateTime;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hydrate_core::{Clock, GatewayError, Result, SessionId, SystemClock};
use parking_lot::Mutex;

use crate::websocket::transport::Outbound;

/// Server-side record of one live connection.
pub struct Session {
    id: SessionId,
    connected_at: NaiveDateTime,
    last_activity_at: Mutex<NaiveDateTime>,
    outbound: Weak<Outbound>,
}

impl Session {
    /// Create a session that delivers into `outbound` without owning it.
    pub fn new(id: SessionId, now: NaiveDateTime, outbound: &Arc<Outbound>) -> Self {
        Self {
            id,
            connected_at: now,
            last_activity_at: Mutex::new(now),
            outbound: Arc::downgrade(outbound),
        }
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// When the connection was accepted.
    pub fn connected_at(&self) -> NaiveDateTime {
        self.connected_at
    }

    /// When the last inbound message arrived (or `connected_at`).
    pub fn last_activity_at(&self) -> NaiveDateTime {
        *self.last_activity_at.lock()
    }

    /// Queue a payload for this session's connection.
    ///
    /// Fails with [`GatewayError::TransportClosed`] when the owning handler
    /// has already torn the connection down. Callers treat that as "the
    /// client already left".
    pub fn deliver(&self, text: Arc<str>) -> Result<()> {
        let outbound = self.outbound.upgrade().ok_or(GatewayError::TransportClosed)?;
        outbound.push(text)
    }

    fn touch(&self, at: NaiveDateTime) {
        *self.last_activity_at.lock() = at;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .field("last_activity_at", &self.last_activity_at())
            .field("live", &(self.outbound.strong_count() > 0))
            .finish()
    }
}

/// Concurrent map of live sessions keyed by id.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    /// Registry stamping activity with the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Registry stamping activity with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
        }
    }

    /// Insert a new session.
    ///
    /// Fails with [`GatewayError::DuplicateId`] if the id is already live.
    pub fn register(&self, session: Session) -> Result<Arc<Session>> {
        match self.sessions.entry(session.id.clone()) {
            Entry::Occupied(entry) => Err(GatewayError::DuplicateId(entry.key().clone())),
            Entry::Vacant(entry) => {
                let session = Arc::new(session);
                let _ = entry.insert(Arc::clone(&session));
                Ok(session)
            }
        }
    }

    /// Remove a session. Idempotent: returns whether anything was removed.
    pub fn unregister(&self, id: &SessionId) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Stamp a session's last activity with the current time. No-op if the
    /// session is already gone.
    pub fn touch(&self, id: &SessionId) {
        if let Some(session) = self.sessions.get(id) {
            session.touch(self.clock.now());
        }
    }

    /// Point-in-time list of live sessions, oldest first.
    ///
    /// Shard locks are held only while copying out the `Arc`s, so iteration
    /// over the result never blocks registration or removal.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<Arc<Session>> =
            self.sessions.iter().map(|entry| Arc::clone(entry.value())).collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    /// Look up one session.
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether a session is live.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use hydrate_core::ManualClock;
    use tokio::sync::mpsc;

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::at(14, 0, 0).unwrap())
    }

    fn make_session(
        clock: &ManualClock,
    ) -> (Session, Arc<Outbound>, mpsc::Receiver<Arc<str>>) {
        let (outbound, rx) = Outbound::channel(8);
        let session = Session::new(SessionId::new(), clock.now(), &outbound);
        (session, outbound, rx)
    }

    #[test]
    fn register_and_unregister() {
        let clock = manual_clock();
        let registry = SessionRegistry::with_clock(clock.clone());
        assert!(registry.is_empty());

        let (s1, _o1, _r1) = make_session(&clock);
        let (s2, _o2, _r2) = make_session(&clock);
        let id1 = s1.id().clone();
        let id2 = s2.id().clone();
        let _ = registry.register(s1).unwrap();
        let _ = registry.register(s2).unwrap();
        assert_eq!(registry.len(), 2);

        assert!(registry.unregister(&id1));
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(&id1));
        assert!(registry.contains(&id2));
    }

    #[test]
    fn duplicate_id_rejected() {
        let clock = manual_clock();
        let registry = SessionRegistry::with_clock(clock.clone());
        let (outbound, _rx) = Outbound::channel(8);
        let id = SessionId::from_raw("sess_dup");

        let _ = registry
            .register(Session::new(id.clone(), clock.now(), &outbound))
            .unwrap();
        let err = registry
            .register(Session::new(id.clone(), clock.now(), &outbound))
            .unwrap_err();
        assert_eq!(err, GatewayError::DuplicateId(id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_twice_is_noop() {
        let clock = manual_clock();
        let registry = SessionRegistry::with_clock(clock.clone());
        let (session, _o, _r) = make_session(&clock);
        let id = session.id().clone();
        let _ = registry.register(session).unwrap();

        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let registry = SessionRegistry::new();
        assert!(!registry.unregister(&SessionId::new()));
    }

    #[test]
    fn touch_updates_last_activity_only() {
        let clock = manual_clock();
        let registry = SessionRegistry::with_clock(clock.clone());
        let (session, _o, _r) = make_session(&clock);
        let id = session.id().clone();
        let connected = session.connected_at();
        let session = registry.register(session).unwrap();

        clock.advance(TimeDelta::seconds(42));
        registry.touch(&id);

        assert_eq!(session.connected_at(), connected);
        assert_eq!(session.last_activity_at(), connected + TimeDelta::seconds(42));
    }

    #[test]
    fn touch_after_unregister_is_noop() {
        let clock = manual_clock();
        let registry = SessionRegistry::with_clock(clock.clone());
        let (session, _o, _r) = make_session(&clock);
        let id = session.id().clone();
        let session = registry.register(session).unwrap();
        let _ = registry.unregister(&id);

        clock.advance(TimeDelta::seconds(5));
        registry.touch(&id);
        assert_eq!(session.last_activity_at(), session.connected_at());
    }

    #[test]
    fn snapshot_size_tracks_registrations() {
        let clock = manual_clock();
        let registry = SessionRegistry::with_clock(clock.clone());
        let mut live = Vec::new();
        let mut keep = Vec::new();

        // Interleave: register 10, drop every third, re-unregister some.
        for i in 0..10 {
            let (session, outbound, rx) = make_session(&clock);
            let id = session.id().clone();
            let _ = registry.register(session).unwrap();
            keep.push((outbound, rx));
            live.push(id);
            if i % 3 == 0 {
                let gone = live.remove(0);
                assert!(registry.unregister(&gone));
                assert!(!registry.unregister(&gone));
            }
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), live.len());
        let ids: Vec<&SessionId> = snapshot.iter().map(|s| s.id()).collect();
        let mut expected: Vec<&SessionId> = live.iter().collect();
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn snapshot_is_point_in_time() {
        let clock = manual_clock();
        let registry = SessionRegistry::with_clock(clock.clone());
        let (session, _o, _r) = make_session(&clock);
        let id = session.id().clone();
        let _ = registry.register(session).unwrap();

        let snapshot = registry.snapshot();
        let _ = registry.unregister(&id);
        let (late, _o2, _r2) = make_session(&clock);
        let _ = registry.register(late).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), &id);
    }

    #[tokio::test]
    async fn deliver_reaches_outbound() {
        let clock = manual_clock();
        let (session, _outbound, mut rx) = make_session(&clock);
        session.deliver(Arc::from("hello")).unwrap();
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn deliver_after_teardown_is_transport_closed() {
        let clock = manual_clock();
        let (session, outbound, rx) = make_session(&clock);
        drop(outbound);
        drop(rx);
        assert_eq!(session.deliver(Arc::from("late")), Err(GatewayError::TransportClosed));
    }

    #[test]
    fn concurrent_register_unregister() {
        let clock = manual_clock();
        let registry = Arc::new(SessionRegistry::with_clock(clock.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let clock = Arc::clone(&clock);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let (session, _o, _r) = make_session(&clock);
                        let id = session.id().clone();
                        let _ = registry.register(session).unwrap();
                        registry.touch(&id);
                        let _ = registry.snapshot();
                        assert!(registry.unregister(&id));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
