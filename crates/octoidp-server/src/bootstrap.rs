//! Startup seeding of clients and local users from configuration.
//!
//! Both steps are idempotent: clients are upserted and users that already
//! exist (matched by email) are left untouched.

use octoidp_auth::client::ClientRegistry;
use octoidp_auth::password::hash_password;
use octoidp_auth::storage::{PasswordStorage, UserStorage};
use octoidp_auth::types::{ClientIdentity, ClientSecret, PasswordInfo, User};
use tracing::{info, warn};

use crate::config::{ClientConfig, UserConfig};

/// Counts of what a bootstrap run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapStats {
    pub clients_registered: usize,
    pub users_created: usize,
    pub users_existing: usize,
}

/// Registers every configured client together with its trusted peers.
///
/// Secrets are stored as SHA-256 digests.
///
/// # Errors
///
/// Returns an error if a redirect URI is invalid or storage fails.
pub async fn bootstrap_clients(
    registry: &ClientRegistry,
    clients: &[ClientConfig],
    stats: &mut BootstrapStats,
) -> anyhow::Result<()> {
    for client in clients {
        let redirect_uris = client
            .parsed_redirect_uris()
            .map_err(anyhow::Error::msg)?;

        let identity = ClientIdentity {
            id: client.id.clone(),
            secret: client
                .secret
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(ClientSecret::hashed),
            redirect_uris,
            public: client.public,
            name: client.name.clone(),
        };
        registry
            .register(identity, client.trusted_peers.clone())
            .await?;
        stats.clients_registered += 1;
    }

    info!(count = stats.clients_registered, "Clients registered");
    Ok(())
}

/// Creates configured local users that do not exist yet.
///
/// # Errors
///
/// Returns an error if hashing or storage fails.
pub async fn bootstrap_users(
    users: &dyn UserStorage,
    passwords: &dyn PasswordStorage,
    configured: &[UserConfig],
    stats: &mut BootstrapStats,
) -> anyhow::Result<()> {
    for entry in configured {
        if users.get_by_email(&entry.email).await?.is_some() {
            stats.users_existing += 1;
            continue;
        }

        let mut user = User::new(entry.name.clone());
        if let Some(id) = entry.id.as_ref().filter(|id| !id.is_empty()) {
            if users.get(id).await?.is_some() {
                warn!(user_id = %id, "User ID already taken, skipping");
                stats.users_existing += 1;
                continue;
            }
            user.id = id.clone();
        }
        user.email = Some(entry.email.clone());
        user.email_verified = true;

        let password = entry.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;

        users.create(&user).await?;
        passwords
            .set_password(&PasswordInfo {
                user_id: user.id.clone(),
                password_hash,
            })
            .await?;

        info!(user_id = %user.id, "Local user created");
        stats.users_created += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use octoidp_auth::client::ClientCredentials;
    use octoidp_db_memory::create_stores;

    fn user(email: &str) -> UserConfig {
        UserConfig {
            id: None,
            name: "Admin".to_string(),
            email: email.to_string(),
            password: "password".to_string(),
        }
    }

    #[tokio::test]
    async fn test_users_are_created_once() {
        let stores = create_stores();
        let configured = vec![user("admin@example.com")];

        let mut stats = BootstrapStats::default();
        bootstrap_users(stores.users.as_ref(), stores.users.as_ref(), &configured, &mut stats)
            .await
            .unwrap();
        bootstrap_users(stores.users.as_ref(), stores.users.as_ref(), &configured, &mut stats)
            .await
            .unwrap();

        assert_eq!(stats.users_created, 1);
        assert_eq!(stats.users_existing, 1);

        let created = stores
            .users
            .get_by_email("admin@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(created.email_verified);
        assert!(stores.users.get_password(&created.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clients_are_hashed_and_trusted() {
        let stores = create_stores();
        let registry = ClientRegistry::new(stores.client_storage());
        let clients = vec![
            ClientConfig {
                id: "web".to_string(),
                secret: Some("s3cret".to_string()),
                redirect_uris: vec!["http://127.0.0.1:5555/callback".to_string()],
                public: false,
                name: None,
                trusted_peers: vec!["cli".to_string()],
            },
            ClientConfig {
                id: "cli".to_string(),
                secret: None,
                redirect_uris: Vec::new(),
                public: true,
                name: None,
                trusted_peers: Vec::new(),
            },
        ];

        let mut stats = BootstrapStats::default();
        bootstrap_clients(&registry, &clients, &mut stats)
            .await
            .unwrap();
        assert_eq!(stats.clients_registered, 2);

        let stored = registry.metadata("web").await.unwrap();
        assert!(matches!(stored.secret, Some(ClientSecret::Sha256(_))));
        registry
            .authenticate(
                &ClientCredentials {
                    client_id: "web".to_string(),
                    client_secret: Some("s3cret".to_string()),
                },
                false,
            )
            .await
            .unwrap();
        assert!(registry.is_trusted_peer("web", "cli"));
        assert!(!registry.is_trusted_peer("cli", "web"));
    }
}
