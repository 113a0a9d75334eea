//! Client lookup and authentication.

use std::sync::Arc;

use url::Url;

use super::TrustedPeers;
use crate::error::{AuthError, AuthResult};
use crate::storage::ClientStorage;
use crate::types::ClientIdentity;

/// Credentials a client presented at the token endpoint.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Client registry backed by [`ClientStorage`].
pub struct ClientRegistry {
    storage: Arc<dyn ClientStorage>,
    peers: TrustedPeers,
}

impl ClientRegistry {
    /// Creates a registry with no trust edges.
    #[must_use]
    pub fn new(storage: Arc<dyn ClientStorage>) -> Self {
        Self {
            storage,
            peers: TrustedPeers::new(),
        }
    }

    /// Returns the registered client.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` for unknown IDs.
    pub async fn metadata(&self, client_id: &str) -> AuthResult<ClientIdentity> {
        self.storage
            .find(client_id)
            .await?
            .ok_or_else(|| AuthError::invalid_client(format!("unknown client '{client_id}'")))
    }

    /// Authenticates a client.
    ///
    /// Public clients pass without a secret when `allow_public` is set.
    /// Confidential clients always need the right secret.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` for unknown clients, a missing or wrong
    /// secret, or a public client where `allow_public` is false. The message
    /// does not say which.
    pub async fn authenticate(
        &self,
        credentials: &ClientCredentials,
        allow_public: bool,
    ) -> AuthResult<ClientIdentity> {
        let rejected = || AuthError::invalid_client("client authentication failed");

        let client = self
            .storage
            .find(&credentials.client_id)
            .await?
            .ok_or_else(rejected)?;

        let authenticated = match (&client.secret, credentials.client_secret.as_deref()) {
            (Some(stored), Some(presented)) => stored.matches(presented),
            (None, _) | (_, None) => client.public && allow_public,
        };

        if !authenticated {
            tracing::info!(client_id = %credentials.client_id, "Client authentication failed");
            return Err(rejected());
        }
        Ok(client)
    }

    /// Resolves the redirect URI of an authorization request.
    ///
    /// An omitted URI is allowed when the client registered exactly one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the URI is malformed, unregistered, or
    /// omitted while several are registered.
    pub fn validate_redirect_uri(
        &self,
        client: &ClientIdentity,
        requested: Option<&str>,
    ) -> AuthResult<Url> {
        match requested {
            Some(raw) => {
                let uri = Url::parse(raw)
                    .map_err(|_| AuthError::invalid_request("redirect_uri is not a valid URL"))?;
                if client.has_redirect_uri(&uri) {
                    Ok(uri)
                } else {
                    Err(AuthError::invalid_request(
                        "redirect_uri is not registered for this client",
                    ))
                }
            }
            None => match client.redirect_uris.as_slice() {
                [only] => Ok(only.clone()),
                _ => Err(AuthError::invalid_request("redirect_uri is required")),
            },
        }
    }

    /// Stores a client and sets the peers it trusts.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty ID, or a storage error.
    pub async fn register(
        &self,
        client: ClientIdentity,
        trusted_peers: Vec<String>,
    ) -> AuthResult<()> {
        if client.id.is_empty() {
            return Err(AuthError::invalid_request("client id must not be empty"));
        }
        self.storage.upsert(&client).await?;
        self.peers.set(&client.id, trusted_peers);
        tracing::debug!(client_id = %client.id, public = client.public, "Client registered");
        Ok(())
    }

    /// Deletes a client and its trust edges.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn unregister(&self, client_id: &str) -> AuthResult<bool> {
        let existed = self.storage.delete(client_id).await?;
        self.peers.remove_client(client_id);
        Ok(existed)
    }

    /// Returns `true` if `peer` may name `requester` as an extra audience.
    ///
    /// A client always trusts itself.
    #[must_use]
    pub fn is_trusted_peer(&self, peer: &str, requester: &str) -> bool {
        peer == requester || self.peers.trusts(peer, requester)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientSecret;
    use async_trait::async_trait;
    use dashmap::DashMap;

    #[derive(Default)]
    struct Clients(DashMap<String, ClientIdentity>);

    #[async_trait]
    impl ClientStorage for Clients {
        async fn find(&self, id: &str) -> AuthResult<Option<ClientIdentity>> {
            Ok(self.0.get(id).map(|c| c.clone()))
        }
        async fn upsert(&self, client: &ClientIdentity) -> AuthResult<()> {
            self.0.insert(client.id.clone(), client.clone());
            Ok(())
        }
        async fn delete(&self, id: &str) -> AuthResult<bool> {
            Ok(self.0.remove(id).is_some())
        }
        async fn list(&self) -> AuthResult<Vec<ClientIdentity>> {
            Ok(self.0.iter().map(|c| c.clone()).collect())
        }
    }

    fn client(id: &str, secret: Option<&str>, public: bool, uris: &[&str]) -> ClientIdentity {
        ClientIdentity {
            id: id.to_string(),
            secret: secret.map(|s| ClientSecret::Plaintext(s.to_string())),
            redirect_uris: uris.iter().map(|u| Url::parse(u).unwrap()).collect(),
            public,
            name: None,
        }
    }

    fn creds(id: &str, secret: Option<&str>) -> ClientCredentials {
        ClientCredentials {
            client_id: id.to_string(),
            client_secret: secret.map(str::to_string),
        }
    }

    async fn registry() -> ClientRegistry {
        let registry = ClientRegistry::new(Arc::new(Clients::default()));
        registry
            .register(
                client("72de74a9", Some("XXX"), false, &["https://app.example.com/cb"]),
                vec![],
            )
            .await
            .unwrap();
        registry
            .register(
                client(
                    "spa",
                    None,
                    true,
                    &["https://spa.example.com/a", "https://spa.example.com/b"],
                ),
                vec![],
            )
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_confidential_client_authentication() {
        let registry = registry().await;

        let ok = registry
            .authenticate(&creds("72de74a9", Some("XXX")), false)
            .await
            .unwrap();
        assert_eq!(ok.id, "72de74a9");

        for bad in [creds("72de74a9", Some("XXY")), creds("72de74a9", None), creds("nope", Some("XXX"))] {
            let err = registry.authenticate(&bad, true).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidClient { .. }));
            assert_eq!(err.to_string(), "Invalid client: client authentication failed");
        }
    }

    #[tokio::test]
    async fn test_public_client_needs_allow_public() {
        let registry = registry().await;
        assert!(registry.authenticate(&creds("spa", None), true).await.is_ok());
        assert!(registry.authenticate(&creds("spa", None), false).await.is_err());
    }

    #[tokio::test]
    async fn test_redirect_uri_validation() {
        let registry = registry().await;
        let app = registry.metadata("72de74a9").await.unwrap();
        let spa = registry.metadata("spa").await.unwrap();

        let only = registry.validate_redirect_uri(&app, None).unwrap();
        assert_eq!(only.as_str(), "https://app.example.com/cb");
        assert!(registry
            .validate_redirect_uri(&app, Some("https://evil.example.com/cb"))
            .is_err());
        assert!(registry.validate_redirect_uri(&spa, None).is_err());
        assert!(registry
            .validate_redirect_uri(&spa, Some("https://spa.example.com/b"))
            .is_ok());
    }

    #[tokio::test]
    async fn test_trusted_peer_lookup() {
        let registry = registry().await;
        registry
            .register(client("api", Some("s"), false, &[]), vec!["72de74a9".to_string()])
            .await
            .unwrap();

        assert!(registry.is_trusted_peer("api", "72de74a9"));
        assert!(!registry.is_trusted_peer("72de74a9", "api"));
        assert!(registry.is_trusted_peer("spa", "spa"));

        assert!(registry.unregister("api").await.unwrap());
        assert!(!registry.is_trusted_peer("api", "72de74a9"));
    }
}
