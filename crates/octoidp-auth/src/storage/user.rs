//! User and password storage traits.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{PasswordInfo, User};

// =============================================================================
// User Storage Trait
// =============================================================================

/// Storage operations for local users.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Stores a new user.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A user with the same ID exists
    /// - One of its remote identities is already linked to another user
    /// - The storage operation fails
    async fn create(&self, user: &User) -> AuthResult<()>;

    /// Finds a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get(&self, id: &str) -> AuthResult<Option<User>>;

    /// Finds the user linked to `remote_id` in `connector_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_by_remote_identity(
        &self,
        connector_id: &str,
        remote_id: &str,
    ) -> AuthResult<Option<User>>;

    /// Finds a user by email, compared case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Replaces an existing user.
    ///
    /// # Errors
    ///
    /// Returns an error if the user does not exist or the storage operation
    /// fails.
    async fn update(&self, user: &User) -> AuthResult<()>;
}

// =============================================================================
// Password Storage Trait
// =============================================================================

/// Storage operations for local password hashes.
#[async_trait]
pub trait PasswordStorage: Send + Sync {
    /// Returns the password info of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_password(&self, user_id: &str) -> AuthResult<Option<PasswordInfo>>;

    /// Creates or replaces the password info of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn set_password(&self, info: &PasswordInfo) -> AuthResult<()>;
}
