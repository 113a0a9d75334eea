//! In-memory login sessions and session keys.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use octoidp_auth::storage::SessionStorage;
use octoidp_auth::types::{Session, SessionKey, SessionState};
use octoidp_auth::{AuthError, AuthResult};

/// Sessions and session keys held in [`DashMap`]s.
///
/// `update` checks and replaces under the shard write lock taken by
/// `get_mut`, and `consume_key` is a single `remove`, so both are atomic.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    sessions: DashMap<String, Session>,
    keys: DashMap<String, SessionKey>,
}

impl MemorySessionStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired ones included.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of stored session keys, expired ones included.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn create(&self, session: &Session) -> AuthResult<()> {
        match self.sessions.entry(session.id.clone()) {
            Entry::Occupied(_) => Err(AuthError::storage("session already exists")),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(())
            }
        }
    }

    async fn find(&self, id: &str) -> AuthResult<Option<Session>> {
        Ok(self.sessions.get(id).map(|s| s.value().clone()))
    }

    async fn update(&self, session: &Session, expected: SessionState) -> AuthResult<bool> {
        match self.sessions.get_mut(&session.id) {
            Some(mut current) if current.state == expected => {
                *current = session.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> AuthResult<()> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn create_key(&self, key: &SessionKey) -> AuthResult<()> {
        match self.keys.entry(key.key.clone()) {
            Entry::Occupied(_) => Err(AuthError::storage("session key already exists")),
            Entry::Vacant(slot) => {
                slot.insert(key.clone());
                Ok(())
            }
        }
    }

    async fn consume_key(&self, key: &str) -> AuthResult<Option<SessionKey>> {
        Ok(self.keys.remove(key).map(|(_, k)| k))
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut removed = 0;

        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| s.is_expired_at(now))
            .map(|s| s.key().clone())
            .collect();
        for id in expired {
            if self
                .sessions
                .remove_if(&id, |_, s| s.is_expired_at(now))
                .is_some()
            {
                removed += 1;
            }
        }

        let expired: Vec<String> = self
            .keys
            .iter()
            .filter(|k| k.is_expired_at(now))
            .map(|k| k.key().clone())
            .collect();
        for key in expired {
            if self
                .keys
                .remove_if(&key, |_, k| k.is_expired_at(now))
                .is_some()
            {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(removed, "Expired sessions and keys removed");
        }
        Ok(removed)
    }
}
