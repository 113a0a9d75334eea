//! In-memory client registrations.

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;

use octoidp_auth::AuthResult;
use octoidp_auth::storage::ClientStorage;
use octoidp_auth::types::ClientIdentity;

/// OAuth 2.0 clients keyed by `client_id`.
#[derive(Debug, Default)]
pub struct MemoryClientStorage {
    clients: PapayaHashMap<String, ClientIdentity>,
}

impl MemoryClientStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStorage for MemoryClientStorage {
    async fn find(&self, id: &str) -> AuthResult<Option<ClientIdentity>> {
        Ok(self.clients.pin().get(id).cloned())
    }

    async fn upsert(&self, client: &ClientIdentity) -> AuthResult<()> {
        self.clients.pin().insert(client.id.clone(), client.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> AuthResult<bool> {
        Ok(self.clients.pin().remove(id).is_some())
    }

    async fn list(&self) -> AuthResult<Vec<ClientIdentity>> {
        let clients = self.clients.pin();
        let mut all: Vec<ClientIdentity> = clients.iter().map(|(_, c)| c.clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}
