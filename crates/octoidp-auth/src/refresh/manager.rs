//! Refresh token issuance, verification and revocation.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use super::{DELIMITER, SecretRing};
use crate::error::{AuthError, AuthResult};
use crate::storage::RefreshTokenStorage;
use crate::types::RefreshTokenRecord;

/// Encrypted part of a refresh token.
#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    user_id: String,
    client_id: String,
}

/// Issues and checks refresh tokens.
///
/// Every failure to read a token (bad format, unknown ID, hash mismatch,
/// decryption failure) is reported as the same `InvalidToken`.
#[derive(Clone)]
pub struct RefreshTokenManager {
    storage: Arc<dyn RefreshTokenStorage>,
    ring: SecretRing,
}

impl RefreshTokenManager {
    /// Creates a manager sealing with the first secret of `ring`.
    #[must_use]
    pub fn new(storage: Arc<dyn RefreshTokenStorage>, ring: SecretRing) -> Self {
        Self { storage, ring }
    }

    /// Issues a token bound to `(user_id, client_id)`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUserId` / `InvalidClientId` for empty inputs, or a
    /// storage error.
    pub async fn create(&self, user_id: &str, client_id: &str) -> AuthResult<String> {
        self.create_with_scopes(user_id, client_id, &[]).await
    }

    /// Issues a token that also remembers the scopes it was granted with.
    ///
    /// # Errors
    ///
    /// Same as [`RefreshTokenManager::create`].
    pub async fn create_with_scopes(
        &self,
        user_id: &str,
        client_id: &str,
        scopes: &[String],
    ) -> AuthResult<String> {
        if user_id.is_empty() {
            return Err(AuthError::InvalidUserId);
        }
        if client_id.is_empty() {
            return Err(AuthError::InvalidClientId);
        }

        let payload = serde_json::to_vec(&Payload {
            user_id: user_id.to_string(),
            client_id: client_id.to_string(),
        })
        .map_err(|e| AuthError::internal(format!("refresh token payload: {e}")))?;
        let sealed = self.ring.seal(&payload)?;

        let id = self.storage.next_id().await?;
        let token = format!("{id}{DELIMITER}{}", URL_SAFE_NO_PAD.encode(sealed));

        self.storage
            .insert(&RefreshTokenRecord {
                id,
                user_id: user_id.to_string(),
                client_id: client_id.to_string(),
                scopes: scopes.to_vec(),
                token_hash: hash_token(&token),
                created_at: OffsetDateTime::now_utc(),
            })
            .await?;

        tracing::debug!(token_id = id, client_id = %client_id, "Refresh token issued");
        Ok(token)
    }

    /// Returns the user a token was issued to.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the token cannot be read, and
    /// `InvalidClientId` if it is valid but bound to another client.
    pub async fn verify(&self, client_id: &str, token: &str) -> AuthResult<String> {
        self.verify_grant(client_id, token)
            .await
            .map(|record| record.user_id)
    }

    /// Like [`RefreshTokenManager::verify`] but returns the whole record,
    /// including the granted scopes.
    ///
    /// # Errors
    ///
    /// Same as [`RefreshTokenManager::verify`].
    pub async fn verify_grant(
        &self,
        client_id: &str,
        token: &str,
    ) -> AuthResult<RefreshTokenRecord> {
        let (record, payload) = self.open(token).await?;
        if payload.client_id != client_id {
            return Err(AuthError::InvalidClientId);
        }
        Ok(record)
    }

    /// Deletes a token after checking that `user_id` owns it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the token cannot be read or is already
    /// gone, and `InvalidUserId` if another user owns it.
    pub async fn revoke(&self, user_id: &str, token: &str) -> AuthResult<()> {
        let (record, payload) = self.open(token).await?;
        if payload.user_id != user_id {
            return Err(AuthError::InvalidUserId);
        }

        self.storage
            .remove(record.id)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        tracing::debug!(token_id = record.id, "Refresh token revoked");
        Ok(())
    }

    /// Deletes every token `user_id` holds for `client_id`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if listing or removal fails.
    pub async fn revoke_all_for_client(&self, user_id: &str, client_id: &str) -> AuthResult<u64> {
        let mut removed = 0;
        for record in self.storage.list_by_user(user_id).await? {
            if record.client_id == client_id && self.storage.remove(record.id).await?.is_some() {
                removed += 1;
            }
        }

        tracing::debug!(client_id = %client_id, removed, "Refresh tokens revoked for client");
        Ok(removed)
    }

    async fn open(&self, token: &str) -> AuthResult<(RefreshTokenRecord, Payload)> {
        let (id, encoded) = token
            .split_once(DELIMITER)
            .ok_or(AuthError::InvalidToken)?;
        let id: i64 = id.parse().map_err(|_| AuthError::InvalidToken)?;
        let sealed = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| AuthError::InvalidToken)?;

        let record = self
            .storage
            .find(id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let presented = hash_token(token);
        if !bool::from(presented.as_bytes().ct_eq(record.token_hash.as_bytes())) {
            return Err(AuthError::InvalidToken);
        }

        let plaintext = self.ring.open(&sealed).ok_or(AuthError::InvalidToken)?;
        let payload: Payload =
            serde_json::from_slice(&plaintext).map_err(|_| AuthError::InvalidToken)?;
        if payload.user_id != record.user_id || payload.client_id != record.client_id {
            return Err(AuthError::InvalidToken);
        }
        Ok((record, payload))
    }
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
