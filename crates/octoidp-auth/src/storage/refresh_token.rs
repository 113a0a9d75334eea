//! Refresh token storage trait.
//!
//! # Security Considerations
//!
//! - Records hold a SHA-256 hash of the token, never the token itself
//! - Removal must be atomic so a revoked token cannot be verified again

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::RefreshTokenRecord;

/// Storage trait for refresh token records.
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Allocates the next token ID. IDs are unique and increasing.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn next_id(&self) -> AuthResult<i64>;

    /// Stores a record under its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID is already taken or the storage operation
    /// fails.
    async fn insert(&self, record: &RefreshTokenRecord) -> AuthResult<()>;

    /// Finds a record by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find(&self, id: i64) -> AuthResult<Option<RefreshTokenRecord>>;

    /// Atomically removes a record, returning it if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove(&self, id: i64) -> AuthResult<Option<RefreshTokenRecord>>;

    /// Lists every record held by a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_by_user(&self, user_id: &str) -> AuthResult<Vec<RefreshTokenRecord>>;
}
