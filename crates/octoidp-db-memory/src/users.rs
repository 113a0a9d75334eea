//! In-memory users, remote identity links and password hashes.

use std::sync::Mutex;

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;

use octoidp_auth::storage::{PasswordStorage, UserStorage};
use octoidp_auth::types::{PasswordInfo, User};
use octoidp_auth::{AuthError, AuthResult};

type LinkKey = (String, String);

/// Users indexed by ID and by linked `(connector, remote ID)` pairs.
///
/// Reads go straight to the lock-free maps. Writes that touch more than one
/// map serialize on `write_lock` so the link index always agrees with the
/// user records.
#[derive(Debug, Default)]
pub struct MemoryUserStorage {
    users: PapayaHashMap<String, User>,
    links: PapayaHashMap<LinkKey, String>,
    passwords: PapayaHashMap<String, PasswordInfo>,
    write_lock: Mutex<()>,
}

impl MemoryUserStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.pin().len()
    }

    fn lock(&self) -> AuthResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| AuthError::internal("user storage lock poisoned"))
    }

    fn check_links_free(&self, user: &User) -> AuthResult<()> {
        let links = self.links.pin();
        for (connector_id, remote_id) in &user.remote_identities {
            if let Some(owner) = links.get(&(connector_id.clone(), remote_id.clone())) {
                if owner != &user.id {
                    return Err(AuthError::storage(format!(
                        "identity {remote_id} of connector {connector_id} is already linked to another user"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserStorage for MemoryUserStorage {
    async fn create(&self, user: &User) -> AuthResult<()> {
        let _guard = self.lock()?;

        if self.users.pin().get(&user.id).is_some() {
            return Err(AuthError::storage(format!("user {} already exists", user.id)));
        }
        self.check_links_free(user)?;

        let links = self.links.pin();
        for (connector_id, remote_id) in &user.remote_identities {
            links.insert((connector_id.clone(), remote_id.clone()), user.id.clone());
        }
        self.users.pin().insert(user.id.clone(), user.clone());

        tracing::debug!(user_id = %user.id, "User created");
        Ok(())
    }

    async fn get(&self, id: &str) -> AuthResult<Option<User>> {
        Ok(self.users.pin().get(id).cloned())
    }

    async fn get_by_remote_identity(
        &self,
        connector_id: &str,
        remote_id: &str,
    ) -> AuthResult<Option<User>> {
        let key = (connector_id.to_string(), remote_id.to_string());
        let Some(user_id) = self.links.pin().get(&key).cloned() else {
            return Ok(None);
        };
        Ok(self.users.pin().get(&user_id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let users = self.users.pin();
        Ok(users
            .iter()
            .map(|(_, user)| user)
            .find(|user| {
                user.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .cloned())
    }

    async fn update(&self, user: &User) -> AuthResult<()> {
        let _guard = self.lock()?;

        let previous = self
            .users
            .pin()
            .get(&user.id)
            .cloned()
            .ok_or_else(|| AuthError::storage(format!("user {} does not exist", user.id)))?;
        self.check_links_free(user)?;

        let links = self.links.pin();
        for (connector_id, remote_id) in &previous.remote_identities {
            if !user.is_linked_to(connector_id, remote_id) {
                links.remove(&(connector_id.clone(), remote_id.clone()));
            }
        }
        for (connector_id, remote_id) in &user.remote_identities {
            links.insert((connector_id.clone(), remote_id.clone()), user.id.clone());
        }
        self.users.pin().insert(user.id.clone(), user.clone());
        Ok(())
    }
}

#[async_trait]
impl PasswordStorage for MemoryUserStorage {
    async fn get_password(&self, user_id: &str) -> AuthResult<Option<PasswordInfo>> {
        Ok(self.passwords.pin().get(user_id).cloned())
    }

    async fn set_password(&self, info: &PasswordInfo) -> AuthResult<()> {
        self.passwords
            .pin()
            .insert(info.user_id.clone(), info.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linked(name: &str, connector_id: &str, remote_id: &str) -> User {
        let mut user = User::new(name);
        user.remote_identities
            .push((connector_id.to_string(), remote_id.to_string()));
        user
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let storage = MemoryUserStorage::new();
        let mut user = linked("Jane", "ldap", "uid=jane");
        user.email = Some("Jane@Example.com".to_string());
        storage.create(&user).await.unwrap();

        assert_eq!(storage.get(&user.id).await.unwrap(), Some(user.clone()));
        assert_eq!(
            storage
                .get_by_remote_identity("ldap", "uid=jane")
                .await
                .unwrap()
                .map(|u| u.id),
            Some(user.id.clone())
        );
        assert!(
            storage
                .get_by_remote_identity("github", "uid=jane")
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(
            storage
                .get_by_email("jane@example.com")
                .await
                .unwrap()
                .map(|u| u.id),
            Some(user.id)
        );
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let storage = MemoryUserStorage::new();
        let user = linked("Jane", "ldap", "uid=jane");
        storage.create(&user).await.unwrap();
        assert!(storage.create(&user).await.is_err());

        let other = linked("Impostor", "ldap", "uid=jane");
        assert!(storage.create(&other).await.is_err());
        assert!(storage.get(&other.id).await.unwrap().is_none());
        assert_eq!(storage.user_count(), 1);
    }

    #[tokio::test]
    async fn test_update_reindexes_links() {
        let storage = MemoryUserStorage::new();
        let mut user = linked("Jane", "ldap", "uid=jane");
        storage.create(&user).await.unwrap();

        user.remote_identities = vec![("github".to_string(), "4242".to_string())];
        user.disabled = true;
        storage.update(&user).await.unwrap();

        assert!(
            storage
                .get_by_remote_identity("ldap", "uid=jane")
                .await
                .unwrap()
                .is_none()
        );
        let found = storage
            .get_by_remote_identity("github", "4242")
            .await
            .unwrap()
            .unwrap();
        assert!(found.disabled);
    }

    #[tokio::test]
    async fn test_update_missing_user_fails() {
        let storage = MemoryUserStorage::new();
        assert!(storage.update(&User::new("ghost")).await.is_err());
    }

    #[tokio::test]
    async fn test_passwords() {
        let storage = MemoryUserStorage::new();
        assert!(storage.get_password("u1").await.unwrap().is_none());

        let info = PasswordInfo {
            user_id: "u1".to_string(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
        };
        storage.set_password(&info).await.unwrap();
        assert_eq!(storage.get_password("u1").await.unwrap(), Some(info));
    }
}
