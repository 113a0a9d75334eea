//! Client storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::ClientIdentity;

// =============================================================================
// Client Storage Trait
// =============================================================================

/// Storage operations for OAuth 2.0 clients.
///
/// # Example
///
/// ```ignore
/// use octoidp_auth::storage::ClientStorage;
///
/// async fn example(storage: &impl ClientStorage) {
///     if let Some(client) = storage.find("72de74a9").await? {
///         println!("Found client with {} redirect URIs", client.redirect_uris.len());
///     }
/// }
/// ```
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Finds a client by `client_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find(&self, id: &str) -> AuthResult<Option<ClientIdentity>>;

    /// Creates or replaces a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn upsert(&self, client: &ClientIdentity) -> AuthResult<()>;

    /// Deletes a client.
    ///
    /// # Returns
    ///
    /// `true` if the client existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, id: &str) -> AuthResult<bool>;

    /// Lists every client.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list(&self) -> AuthResult<Vec<ClientIdentity>>;
}
