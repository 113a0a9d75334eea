//! Login session and session key types.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use super::RemoteIdentity;

// =============================================================================
// Session State
// =============================================================================

/// Position of a session in the login state machine.
///
/// Transitions only move forward:
/// `New -> IdentityAttached -> UserAttached -> Answered -> Exchanged`.
/// `Expired` is never stored; it is derived from `expires_at` at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created by the authorization endpoint.
    New,
    /// A connector verified the user.
    IdentityAttached,
    /// The remote identity resolved to a local user.
    UserAttached,
    /// Login finished; a session key may be minted.
    Answered,
    /// The session key was redeemed. Terminal.
    Exchanged,
    /// The session outlived its TTL. Terminal.
    Expired,
}

impl SessionState {
    /// Returns the state name used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::IdentityAttached => "identity_attached",
            Self::UserAttached => "user_attached",
            Self::Answered => "answered",
            Self::Exchanged => "exchanged",
            Self::Expired => "expired",
        }
    }

    /// Returns `true` for states that accept no further transition.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exchanged | Self::Expired)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Session
// =============================================================================

/// Parameters of a new login session, already validated by the
/// authorization endpoint.
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Connector the user will log in with.
    pub connector_id: String,
    /// Requesting client.
    pub client_id: String,
    /// Opaque `state` to hand back to the client.
    pub client_state: Option<String>,
    /// Where the code is delivered.
    pub redirect_uri: Url,
    /// OIDC nonce to echo in the ID token.
    pub nonce: Option<String>,
    /// Create a local user if none is linked yet.
    pub register: bool,
    /// Requested scopes.
    pub scopes: Vec<String>,
}

/// One interactive login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub connector_id: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_state: Option<String>,
    pub redirect_uri: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub register: bool,
    pub scopes: Vec<String>,

    /// Stored state. Use [`Session::state_at`] to account for expiry.
    pub state: SessionState,

    /// Set once by `AttachRemoteIdentity`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<RemoteIdentity>,

    /// Set once by `AttachUser`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Session {
    /// Returns `true` once `now` has reached `expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Effective state at `now`. Non-terminal sessions past their expiry
    /// report `Expired`.
    #[must_use]
    pub fn state_at(&self, now: OffsetDateTime) -> SessionState {
        if !self.state.is_terminal() && self.is_expired_at(now) {
            SessionState::Expired
        } else {
            self.state
        }
    }

    /// Returns `true` if `scope` was requested.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

// =============================================================================
// Session Key
// =============================================================================

/// One-time key (the authorization code) bound to a single session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionKey {
    pub key: String,
    pub session_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl SessionKey {
    /// Returns `true` once `now` has reached `expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}
