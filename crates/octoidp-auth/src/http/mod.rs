//! Axum handlers for the OIDC endpoints.
//!
//! | method | path | handler |
//! |--------|------|---------|
//! | GET | `/auth` | [`authorize_handler`] |
//! | GET/POST | `/auth/{connector_id}/login` | [`login_form_handler`], [`login_submit_handler`] |
//! | GET | `/auth/{connector_id}/callback` | [`callback_handler`] |
//! | POST | `/token` | [`token_handler`] |
//! | POST | `/token/revoke` | [`revoke_handler`] |
//! | GET | `/keys` | [`keys_handler`] |
//! | GET | `/.well-known/openid-configuration` | [`discovery_handler`] |
//! | GET | `/health` | [`health_handler`] |
//!
//! Every JSON error uses the OAuth 2.0 body `{error, error_description}`.

mod authorize;
mod discovery;
mod health;
mod keys;
mod login;
mod templates;
mod token;

pub use authorize::authorize_handler;
pub use discovery::discovery_handler;
pub use health::health_handler;
pub use keys::keys_handler;
pub use login::{callback_handler, login_form_handler, login_submit_handler};
pub use token::{revoke_handler, token_handler};

use std::sync::Arc;

use axum::{
    Json, Router,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use url::Url;

use crate::error::AuthError;
use crate::oauth::{AuthorizationServer, TokenError};

/// Shared state of every handler.
#[derive(Clone)]
pub struct IdpState {
    pub server: Arc<AuthorizationServer>,
}

impl IdpState {
    #[must_use]
    pub fn new(server: Arc<AuthorizationServer>) -> Self {
        Self { server }
    }
}

/// Builds the router with every identity provider route.
pub fn router(state: IdpState) -> Router {
    Router::new()
        .route("/auth", get(authorize_handler))
        .route(
            "/auth/{connector_id}/login",
            get(login_form_handler).post(login_submit_handler),
        )
        .route("/auth/{connector_id}/callback", get(callback_handler))
        .route("/token", post(token_handler))
        .route("/token/revoke", post(revoke_handler))
        .route("/keys", get(keys_handler))
        .route("/.well-known/openid-configuration", get(discovery_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `302 Found` to `location`.
pub(crate) fn found(location: &Url) -> Response {
    match HeaderValue::from_str(location.as_str()) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => error_response(&AuthError::internal("redirect URL is not a valid header")),
    }
}

/// Maps an error onto its status and OAuth error body.
///
/// Server errors are logged in full and answered with a generic
/// description.
pub(crate) fn error_response(error: &AuthError) -> Response {
    let body = TokenError::from(error);
    if error.is_server_error() {
        tracing::error!(error = %error, category = %error.category(), "Request failed");
    } else {
        tracing::debug!(error = %error, category = %error.category(), "Request rejected");
    }

    let status = StatusCode::from_u16(body.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
    (
        status,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::ConnectorError;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (AuthError::invalid_request("x"), StatusCode::BAD_REQUEST),
            (AuthError::invalid_client("x"), StatusCode::UNAUTHORIZED),
            (AuthError::KeyNotFound, StatusCode::BAD_REQUEST),
            (AuthError::temporarily_unavailable("x"), StatusCode::SERVICE_UNAVAILABLE),
            (
                AuthError::from(ConnectorError::timeout("ldap")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (AuthError::storage("x"), StatusCode::INTERNAL_SERVER_ERROR),
            (
                AuthError::key_manager_uninitialized("x"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            let response = error_response(&error);
            assert_eq!(response.status(), status, "{error}");
            assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        }
    }

    #[test]
    fn test_found_sets_location() {
        let url = Url::parse("https://app.example.com/cb?code=abc").unwrap();
        let response = found(&url);
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://app.example.com/cb?code=abc"
        );
    }
}
