//! OAuth 2.0 client types.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use url::Url;

// =============================================================================
// Grant Type
// =============================================================================

/// OAuth 2.0 grant types served by the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization Code flow.
    AuthorizationCode,
    /// Refresh Token flow.
    RefreshToken,
    /// Client Credentials flow (confidential clients only).
    ClientCredentials,
}

impl GrantType {
    /// All supported grant types, in discovery order.
    pub const ALL: [GrantType; 3] = [
        Self::AuthorizationCode,
        Self::RefreshToken,
        Self::ClientCredentials,
    ];

    /// Returns the OAuth 2.0 `grant_type` parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::ClientCredentials => "client_credentials",
        }
    }

    /// Parses a `grant_type` parameter.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.as_str() == value)
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Client Secret
// =============================================================================

/// A client secret as stored.
///
/// Comparison hashes both sides with SHA-256 and compares the digests in
/// constant time, so neither the content nor the length of the stored
/// secret leaks through timing.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ClientSecret {
    /// Secret kept as given (trusted static configuration).
    Plaintext(String),
    /// Hex SHA-256 digest of the secret.
    Sha256(String),
}

impl ClientSecret {
    /// Hashes `secret` for storage.
    #[must_use]
    pub fn hashed(secret: &str) -> Self {
        Self::Sha256(hex::encode(Sha256::digest(secret.as_bytes())))
    }

    /// Compares a presented secret against this one in constant time.
    #[must_use]
    pub fn matches(&self, presented: &str) -> bool {
        let presented = Sha256::digest(presented.as_bytes());
        let stored: Vec<u8> = match self {
            Self::Plaintext(secret) => Sha256::digest(secret.as_bytes()).to_vec(),
            Self::Sha256(digest) => match hex::decode(digest) {
                Ok(bytes) => bytes,
                Err(_) => return false,
            },
        };
        if stored.len() != presented.len() {
            return false;
        }
        bool::from(stored.as_slice().ct_eq(presented.as_slice()))
    }
}

impl std::fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plaintext(_) => f.write_str("ClientSecret::Plaintext(***)"),
            Self::Sha256(_) => f.write_str("ClientSecret::Sha256(***)"),
        }
    }
}

// =============================================================================
// Client Identity
// =============================================================================

/// A registered OAuth 2.0 client.
///
/// Trusted peers are not stored here; they live in the registry's edge list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// The `client_id`.
    pub id: String,

    /// Secret for confidential clients. Public clients have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<ClientSecret>,

    /// Registered redirect URIs, compared after URL normalization.
    #[serde(default)]
    pub redirect_uris: Vec<Url>,

    /// Public clients cannot keep a secret.
    #[serde(default)]
    pub public: bool,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ClientIdentity {
    /// Returns `true` if `uri` exactly matches a registered redirect URI.
    #[must_use]
    pub fn has_redirect_uri(&self, uri: &Url) -> bool {
        self.redirect_uris.iter().any(|registered| registered == uri)
    }

    /// Returns `true` for clients holding a secret.
    #[must_use]
    pub fn is_confidential(&self) -> bool {
        !self.public && self.secret.is_some()
    }
}
