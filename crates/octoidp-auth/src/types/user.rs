//! Local user accounts.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A local user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// UUID v4 string. Used as the `sub` claim.
    pub id: String,

    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default)]
    pub email_verified: bool,

    /// Disabled users cannot log in or refresh.
    #[serde(default)]
    pub disabled: bool,

    /// Linked `(connector ID, remote ID)` pairs.
    #[serde(default)]
    pub remote_identities: Vec<(String, String)>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// Creates an enabled user with a fresh UUID.
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            display_name: display_name.into(),
            email: None,
            email_verified: false,
            disabled: false,
            remote_identities: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Returns `true` if this user is linked to `remote_id` in `connector_id`.
    #[must_use]
    pub fn is_linked_to(&self, connector_id: &str, remote_id: &str) -> bool {
        self.remote_identities
            .iter()
            .any(|(c, r)| c == connector_id && r == remote_id)
    }
}

/// Password hash of a local user. Only the Local connector reads these.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordInfo {
    pub user_id: String,
    /// Argon2id PHC string.
    pub password_hash: String,
}

impl std::fmt::Debug for PasswordInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordInfo")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}
