//! Token and revocation endpoint handlers.
//!
//! # Example
//!
//! ```ignore
//! // Authorization code grant
//! POST /token
//! Content-Type: application/x-www-form-urlencoded
//! Authorization: Basic <base64(client_id:client_secret)>
//!
//! grant_type=authorization_code&code=SplxlOBeZQQYbYS6WxSbIA
//!
//! // Client credentials grant, secret in the body
//! POST /token
//! Content-Type: application/x-www-form-urlencoded
//!
//! grant_type=client_credentials&client_id=72de74a9&client_secret=...
//! ```

use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};

use super::{IdpState, error_response};
use crate::client::ClientCredentials;
use crate::error::AuthError;
use crate::oauth::{RevocationRequest, TokenRequest, TokenResponse};

/// Handler for `POST /token`.
pub async fn token_handler(
    State(state): State<IdpState>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Response {
    let grant_type = request.grant_type.clone().unwrap_or_default();
    let Some(auth) = extract_client_auth(
        &headers,
        request.client_id.as_deref(),
        request.client_secret.as_deref(),
    ) else {
        return token_error_response(
            &AuthError::invalid_client("no client credentials provided"),
            false,
        );
    };

    tracing::debug!(
        client_id = %auth.credentials.client_id,
        grant_type = %grant_type,
        "Processing token request"
    );

    match state.server.token(&auth.credentials, request).await {
        Ok(response) => {
            tracing::info!(
                client_id = %auth.credentials.client_id,
                grant_type = %grant_type,
                refresh_token = response.refresh_token.is_some(),
                "Token issued"
            );
            token_success_response(response)
        }
        Err(error) => {
            tracing::warn!(
                client_id = %auth.credentials.client_id,
                grant_type = %grant_type,
                error = %error,
                "Token request failed"
            );
            token_error_response(&error, auth.basic)
        }
    }
}

/// Handler for `POST /token/revoke` (RFC 7009).
///
/// Answers 200 with an empty body once the client authenticates, whether
/// or not the token was valid.
pub async fn revoke_handler(
    State(state): State<IdpState>,
    headers: HeaderMap,
    Form(request): Form<RevocationRequest>,
) -> Response {
    let Some(auth) = extract_client_auth(
        &headers,
        request.client_id.as_deref(),
        request.client_secret.as_deref(),
    ) else {
        return token_error_response(
            &AuthError::invalid_client("no client credentials provided"),
            false,
        );
    };

    match state.server.revoke(&auth.credentials, request).await {
        Ok(()) => (
            StatusCode::OK,
            [
                (header::CACHE_CONTROL, "no-store"),
                (header::PRAGMA, "no-cache"),
            ],
        )
            .into_response(),
        Err(error) => token_error_response(&error, auth.basic),
    }
}

/// Client credentials and where they came from.
struct ClientAuth {
    credentials: ClientCredentials,
    basic: bool,
}

/// Reads client credentials: HTTP Basic first, then the form body.
///
/// Basic credentials are form-urlencoded per RFC 6749 section 2.3.1.
fn extract_client_auth(
    headers: &HeaderMap,
    body_client_id: Option<&str>,
    body_client_secret: Option<&str>,
) -> Option<ClientAuth> {
    if let Some((client_id, client_secret)) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_basic_auth)
    {
        return Some(ClientAuth {
            credentials: ClientCredentials {
                client_id,
                client_secret: Some(client_secret),
            },
            basic: true,
        });
    }

    let client_id = body_client_id.filter(|id| !id.is_empty())?;
    Some(ClientAuth {
        credentials: ClientCredentials {
            client_id: client_id.to_string(),
            client_secret: body_client_secret
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        },
        basic: false,
    })
}

fn parse_basic_auth(value: &str) -> Option<(String, String)> {
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;

    let id = url_decode(id)?;
    let secret = url_decode(secret)?;
    (!id.is_empty()).then_some((id, secret))
}

fn url_decode(value: &str) -> Option<String> {
    url::form_urlencoded::parse(format!("v={value}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
}

fn token_success_response(response: TokenResponse) -> Response {
    (
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    )
        .into_response()
}

fn token_error_response(error: &AuthError, basic_attempted: bool) -> Response {
    let mut response = error_response(error);
    if basic_attempted && response.status() == StatusCode::UNAUTHORIZED {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"octoidp\""),
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(id: &str, secret: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")));
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_basic_takes_precedence_over_body() {
        let auth = extract_client_auth(&basic("72de74a9", "s3cret"), Some("other"), Some("x"))
            .unwrap();
        assert!(auth.basic);
        assert_eq!(auth.credentials.client_id, "72de74a9");
        assert_eq!(auth.credentials.client_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_body_credentials() {
        let auth = extract_client_auth(&HeaderMap::new(), Some("web"), Some("pw")).unwrap();
        assert!(!auth.basic);
        assert_eq!(auth.credentials.client_secret.as_deref(), Some("pw"));

        let public = extract_client_auth(&HeaderMap::new(), Some("cli"), None).unwrap();
        assert!(public.credentials.client_secret.is_none());

        assert!(extract_client_auth(&HeaderMap::new(), None, Some("pw")).is_none());
    }

    #[test]
    fn test_basic_credentials_are_url_decoded() {
        let auth = extract_client_auth(&basic("my%20app", "a%3Ab"), None, None).unwrap();
        assert_eq!(auth.credentials.client_id, "my app");
        assert_eq!(auth.credentials.client_secret.as_deref(), Some("a:b"));
    }

    #[test]
    fn test_malformed_basic_falls_back_to_body() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic !!!".parse().unwrap());
        let auth = extract_client_auth(&headers, Some("web"), None).unwrap();
        assert!(!auth.basic);
    }

    #[test]
    fn test_invalid_client_challenges_basic() {
        let error = AuthError::invalid_client("bad secret");
        let response = token_error_response(&error, true);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let response = token_error_response(&error, false);
        assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));
    }
}
