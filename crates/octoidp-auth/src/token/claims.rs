//! ID token claims.

use serde::{Deserialize, Serialize};

/// The `aud` claim.
///
/// A single audience serializes as a plain string. Extra audiences from
/// trusted peers turn it into an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    /// Builds the audience for `client_id` plus `peers`, dropping duplicates.
    #[must_use]
    pub fn new(client_id: &str, peers: &[String]) -> Self {
        let mut all = vec![client_id.to_string()];
        for peer in peers {
            if !all.contains(peer) {
                all.push(peer.clone());
            }
        }

        if all.len() == 1 {
            Self::One(all.remove(0))
        } else {
            Self::Many(all)
        }
    }

    /// Returns `true` if `id` is one of the audiences.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        match self {
            Self::One(aud) => aud == id,
            Self::Many(auds) => auds.iter().any(|aud| aud == id),
        }
    }

    /// Returns `true` when the token names more than one audience.
    #[must_use]
    pub fn is_multiple(&self) -> bool {
        matches!(self, Self::Many(auds) if auds.len() > 1)
    }
}

/// OpenID Connect ID token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer URL.
    pub iss: String,

    /// Subject: the user ID, or the client ID for `client_credentials`.
    pub sub: String,

    /// Audience: the requesting client and any trusting peers.
    pub aud: Audience,

    /// Authorized party. Set only when `aud` names several clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Display name.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,

    /// Nonce from the authorization request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}
