//! Token endpoint types.
//!
//! # Supported Grant Types
//!
//! - `authorization_code` - Exchange a session key for tokens
//! - `refresh_token` - Mint a fresh ID token from a refresh token
//! - `client_credentials` - Machine-to-machine token for the client itself

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Token request parameters (form-encoded body).
///
/// Which fields are required depends on `grant_type`:
///
/// - `authorization_code`: code, (optional) redirect_uri
/// - `refresh_token`: refresh_token
/// - `client_credentials`: (optional) scope
///
/// Clients authenticate with HTTP Basic (not in this struct) or with
/// `client_id` + `client_secret` in the body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: Option<String>,

    #[serde(default)]
    pub code: Option<String>,

    /// Must match the URI the code was delivered to, when present.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Token revocation request parameters (RFC 7009).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevocationRequest {
    #[serde(default)]
    pub token: Option<String>,

    /// Only `refresh_token` is meaningful; other hints are ignored.
    #[serde(default)]
    pub token_type_hint: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Successful token response.
///
/// `access_token` carries the ID token: the server issues no separate
/// access token.
///
/// # Example Response
///
/// ```json
/// {
///   "access_token": "eyJhbGciOiJSUzI1NiIs...",
///   "token_type": "bearer",
///   "expires_in": 3600,
///   "id_token": "eyJhbGciOiJSUzI1NiIs...",
///   "refresh_token": "17/ZXlKMWMyVnlYMmxr...",
///   "scope": "openid profile email offline_access"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    /// Always "bearer".
    pub token_type: String,

    /// ID token lifetime in seconds.
    pub expires_in: u64,

    pub id_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Granted scopes (space-separated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Creates a response carrying `id_token` as both tokens.
    #[must_use]
    pub fn new(id_token: String, expires_in: u64) -> Self {
        Self {
            access_token: id_token.clone(),
            token_type: "bearer".to_string(),
            expires_in,
            id_token,
            refresh_token: None,
            scope: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }

    /// Sets the granted scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: &[String]) -> Self {
        if !scopes.is_empty() {
            self.scope = Some(scopes.join(" "));
        }
        self
    }
}

/// OAuth 2.0 error body.
///
/// Every JSON error the server returns has this shape.
///
/// ```json
/// {
///   "error": "invalid_grant",
///   "error_description": "The provided grant is invalid, expired or revoked"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenError {
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenError {
    /// Creates an error body from its parts.
    #[must_use]
    pub fn new(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: Some(description.into()),
        }
    }

    /// Returns the HTTP status for this error code.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self.error.as_str() {
            "invalid_client" => 401,
            "server_error" => 500,
            "temporarily_unavailable" => 503,
            _ => 400,
        }
    }
}

impl From<&AuthError> for TokenError {
    fn from(err: &AuthError) -> Self {
        Self::new(err.oauth_error_code(), err.public_description())
    }
}
