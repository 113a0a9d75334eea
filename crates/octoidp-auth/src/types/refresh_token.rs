//! Stored refresh token record.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The server-side half of a refresh token.
///
/// The token string itself is never stored, only its SHA-256 hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// Handle that prefixes the wire form.
    pub id: i64,
    pub user_id: String,
    pub client_id: String,
    /// Scopes granted with the token. Refreshed ID tokens carry the same
    /// claims.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Hex SHA-256 of the full token string.
    pub token_hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
