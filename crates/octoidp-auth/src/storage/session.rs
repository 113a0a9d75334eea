//! Login session storage trait.
//!
//! # Implementation Notes
//!
//! Implementations must make two operations atomic:
//!
//! - [`SessionStorage::update`] is a compare-and-swap on the session state
//! - [`SessionStorage::consume_key`] removes the key and returns it to at
//!   most one caller
//!
//! Everything else about the login state machine lives in
//! [`SessionManager`](crate::session::SessionManager).

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::{Session, SessionKey, SessionState};

/// Storage trait for login sessions and session keys.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Stores a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if a session with the same ID exists or the storage
    /// operation fails.
    async fn create(&self, session: &Session) -> AuthResult<()>;

    /// Finds a session by ID, expired or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find(&self, id: &str) -> AuthResult<Option<Session>>;

    /// Replaces a session if its stored state still equals `expected`.
    ///
    /// # Returns
    ///
    /// `true` if the session was replaced, `false` if it is missing or its
    /// state moved on.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn update(&self, session: &Session, expected: SessionState) -> AuthResult<bool>;

    /// Deletes a session. Deleting a missing session is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, id: &str) -> AuthResult<()>;

    /// Stores a new session key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key exists or the storage operation fails.
    async fn create_key(&self, key: &SessionKey) -> AuthResult<()>;

    /// Atomically removes and returns a session key.
    ///
    /// Concurrent calls for the same key return `Some` to exactly one caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn consume_key(&self, key: &str) -> AuthResult<Option<SessionKey>>;

    /// Deletes sessions and keys that expired before `now`.
    ///
    /// # Returns
    ///
    /// The number of removed entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup fails.
    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
