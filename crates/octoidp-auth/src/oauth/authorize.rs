//! Authorization endpoint types.
//!
//! # Authorization Code Flow
//!
//! 1. The client sends the user to `/auth` with request parameters
//! 2. The user logs in through the selected connector
//! 3. The server redirects back to the client with `code` and `state`
//! 4. The client exchanges the code at the token endpoint

use serde::Deserialize;
use url::Url;

use crate::error::AuthError;

/// Authorization request parameters, received as the `/auth` query string.
///
/// Every field is optional at the parsing stage so that a missing
/// parameter becomes an OAuth error instead of a rejected query.
///
/// # Example
///
/// ```ignore
/// GET /auth?
///   response_type=code
///   &client_id=72de74a9
///   &redirect_uri=https://app.example.com/callback
///   &scope=openid profile email offline_access
///   &state=abc123xyz
///   &connector_id=local
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationRequest {
    /// Must be "code".
    #[serde(default)]
    pub response_type: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    /// Optional when the client registered exactly one redirect URI.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Space-separated scopes. Must include `openid`.
    #[serde(default)]
    pub scope: Option<String>,

    /// Opaque value echoed back to the client.
    #[serde(default)]
    pub state: Option<String>,

    /// OpenID Connect nonce, echoed in the ID token.
    #[serde(default)]
    pub nonce: Option<String>,

    /// Connector to log in with. Optional when only one is registered.
    #[serde(default)]
    pub connector_id: Option<String>,

    /// Create a local user on first login even if auto-registration is off.
    #[serde(default)]
    pub register: Option<bool>,
}

/// Why an authorization request failed, and where the error goes.
#[derive(Debug)]
pub enum AuthorizationFailure {
    /// The client or redirect URI could not be verified. The error is shown
    /// to the user and never redirected.
    Direct(AuthError),

    /// The redirect URI is trusted; the error travels back to the client.
    Redirect {
        error: AuthError,
        location: Url,
    },
}

impl AuthorizationFailure {
    /// Returns the underlying error.
    #[must_use]
    pub fn error(&self) -> &AuthError {
        match self {
            Self::Direct(error) | Self::Redirect { error, .. } => error,
        }
    }
}

/// Builds the success redirect: `redirect_uri?code=...&state=...`.
#[must_use]
pub fn code_redirect(redirect_uri: &Url, code: &str, state: Option<&str>) -> Url {
    let mut url = redirect_uri.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("code", code);
        if let Some(state) = state {
            pairs.append_pair("state", state);
        }
    }
    url
}

/// Builds the error redirect with `error`, `error_description` and `state`.
#[must_use]
pub fn error_redirect(redirect_uri: &Url, error: &AuthError, state: Option<&str>) -> Url {
    let mut url = redirect_uri.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("error", error.oauth_error_code());
        pairs.append_pair("error_description", &error.public_description());
        if let Some(state) = state {
            pairs.append_pair("state", state);
        }
    }
    url
}
