//! Process-local session store.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use lvkit_shared::{Result, Session, SessionId};

use crate::{SessionStore, expires_at};

/// In-memory [`SessionStore`]; contents are lost when the process exits.
#[derive(Debug)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, (Session, DateTime<Utc>)>>,
    ttl: Duration,
}

impl MemoryStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

impl SessionStore for MemoryStore {
    async fn put(&self, session: &Session) -> Result<()> {
        let expires = expires_at(Utc::now(), self.ttl)?;
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), (session.clone(), expires));
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        let now = Utc::now();
        Ok(self
            .sessions
            .read()
            .await
            .get(id)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(session, _)| session.clone()))
    }

    async fn delete(&self, id: &SessionId) -> Result<bool> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<Session>> {
        let now = Utc::now();
        let mut live: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(session, _)| session.clone())
            .collect();
        live.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        Ok(live)
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, (_, expires_at)| *expires_at > now);
        Ok(before - sessions.len())
    }
}
