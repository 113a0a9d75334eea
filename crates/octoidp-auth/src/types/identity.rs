//! Remote identity returned by connectors.

use serde::{Deserialize, Serialize};

/// A user as seen by one connector.
///
/// `id` is only unique within the connector that produced it. It is never a
/// local user ID; the server resolves it to a [`User`](super::User) on every
/// login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIdentity {
    /// Subject ID in the connector's namespace.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Email address, if the upstream disclosed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl RemoteIdentity {
    /// Creates an identity without an email.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
        }
    }

    /// Sets the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}
