//! OpenID Connect discovery document.

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::{Value, json};

use super::IdpState;
use crate::oauth::AuthorizationServer;
use crate::oauth::scope;
use crate::types::GrantType;

/// Handler for `GET /.well-known/openid-configuration`.
pub async fn discovery_handler(State(state): State<IdpState>) -> impl IntoResponse {
    Json(discovery_document(&state.server))
}

fn discovery_document(server: &AuthorizationServer) -> Value {
    let base = server.issuer_base();
    let grant_types: Vec<&str> = GrantType::ALL.iter().map(GrantType::as_str).collect();

    json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/auth"),
        "token_endpoint": format!("{base}/token"),
        "jwks_uri": format!("{base}/keys"),
        "revocation_endpoint": format!("{base}/token/revoke"),
        "response_types_supported": ["code"],
        "grant_types_supported": grant_types,
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": [server.signing_algorithm().as_str()],
        "scopes_supported": scope::SUPPORTED,
        "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post"],
        "claims_supported": [
            "aud", "azp", "email", "email_verified", "exp", "iat", "iss", "name", "nonce", "sub"
        ],
    })
}
