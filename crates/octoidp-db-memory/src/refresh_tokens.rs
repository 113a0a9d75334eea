//! In-memory refresh token records.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;

use octoidp_auth::storage::RefreshTokenStorage;
use octoidp_auth::types::RefreshTokenRecord;
use octoidp_auth::{AuthError, AuthResult};

/// Refresh token records in a lock-free papaya map.
#[derive(Debug)]
pub struct MemoryRefreshTokenStorage {
    records: PapayaHashMap<i64, RefreshTokenRecord>,
    next_id: AtomicI64,
}

impl Default for MemoryRefreshTokenStorage {
    fn default() -> Self {
        Self {
            records: PapayaHashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MemoryRefreshTokenStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.pin().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RefreshTokenStorage for MemoryRefreshTokenStorage {
    async fn next_id(&self) -> AuthResult<i64> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn insert(&self, record: &RefreshTokenRecord) -> AuthResult<()> {
        let records = self.records.pin();
        records
            .try_insert(record.id, record.clone())
            .map(|_| ())
            .map_err(|_| AuthError::storage(format!("refresh token {} already exists", record.id)))
    }

    async fn find(&self, id: i64) -> AuthResult<Option<RefreshTokenRecord>> {
        Ok(self.records.pin().get(&id).cloned())
    }

    async fn remove(&self, id: i64) -> AuthResult<Option<RefreshTokenRecord>> {
        Ok(self.records.pin().remove(&id).cloned())
    }

    async fn list_by_user(&self, user_id: &str) -> AuthResult<Vec<RefreshTokenRecord>> {
        let records = self.records.pin();
        let mut found: Vec<RefreshTokenRecord> = records
            .iter()
            .filter(|(_, r)| r.user_id == user_id)
            .map(|(_, r)| r.clone())
            .collect();
        found.sort_by_key(|r| r.id);
        Ok(found)
    }
}
