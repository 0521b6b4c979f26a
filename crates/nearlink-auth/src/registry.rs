//! In-memory session registry
//!
//! Shared between the radio matcher and the HTTP handlers. Every operation takes
//! the lock for exactly one lookup or one check-and-mutate, so a finish request and
//! a proximity confirmation on the same session are serialized.

use crate::session::{Session, SessionId};
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct RegistryData {
    sessions: HashMap<SessionId, Session>,
    /// sid -> session id
    by_sid: HashMap<String, SessionId>,
}

/// Concurrency-safe store of linking sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    data: RwLock<RegistryData>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a new session
    pub async fn create(&self) -> Session {
        let mut data = self.data.write().await;

        let mut session = Session::new();
        while data.by_sid.contains_key(&session.sid) {
            session = Session::new();
        }

        data.by_sid.insert(session.sid.clone(), session.id);
        data.sessions.insert(session.id, session.clone());

        debug!("Registered session {} (sid={})", session.id, session.sid);
        session
    }

    /// Look up a session by its public sid
    pub async fn by_sid(&self, sid: &str) -> Option<Session> {
        let data = self.data.read().await;
        data.by_sid
            .get(sid)
            .and_then(|id| data.sessions.get(id))
            .cloned()
    }

    /// Look up a session by id
    pub async fn by_id(&self, id: &SessionId) -> Option<Session> {
        let data = self.data.read().await;
        data.sessions.get(id).cloned()
    }

    /// Apply `mutator` to a session atomically.
    ///
    /// Returns `None` if the session does not exist, otherwise whatever the
    /// mutator returned.
    pub async fn update<R>(&self, id: &SessionId, mutator: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut data = self.data.write().await;
        data.sessions.get_mut(id).map(mutator)
    }

    /// Id of the first session satisfying `predicate`. Iteration order is unspecified.
    pub async fn find(&self, predicate: impl Fn(&Session) -> bool) -> Option<SessionId> {
        let data = self.data.read().await;
        data.sessions
            .values()
            .find(|s| predicate(s))
            .map(|s| s.id)
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.data.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.sessions.is_empty()
    }

    /// Drop sessions created more than `max_age` ago. Returns how many were removed.
    pub async fn purge_older_than(&self, max_age: Duration) -> usize {
        let cutoff = match chrono::Duration::from_std(max_age) {
            Ok(age) => Utc::now() - age,
            Err(_) => return 0,
        };

        let mut data = self.data.write().await;
        let before = data.sessions.len();
        data.sessions.retain(|_, s| s.created_at >= cutoff);

        let RegistryData { sessions, by_sid } = &mut *data;
        by_sid.retain(|_, id| sessions.contains_key(id));

        let removed = before - sessions.len();
        if removed > 0 {
            info!("Purged {} expired session(s)", removed);
        }
        removed
    }
}
