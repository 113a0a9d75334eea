//! Connector login pages and callbacks.
//!
//! Password connectors (Local, LDAP) render a form here and receive the
//! submitted credentials. Redirect connectors (remote OIDC) come back to the
//! callback with an upstream code and the session ID as `state`.

use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;

use super::templates::render_login_form;
use super::{IdpState, error_response, found};
use crate::connector::{ConnectorError, Credentials};
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub session_id: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    /// The session ID, round-tripped through the upstream provider.
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Handler for `GET /auth/{connector_id}/login`.
pub async fn login_form_handler(
    State(state): State<IdpState>,
    Path(connector_id): Path<String>,
    Query(query): Query<LoginQuery>,
) -> Response {
    match render_form(&state, &connector_id, &query.session_id, None).await {
        Ok(html) => Html(html).into_response(),
        Err(error) => error_response(&error),
    }
}

/// Handler for `POST /auth/{connector_id}/login`.
///
/// - success: redirect to the client with the code
/// - wrong credentials: the form again, 401
/// - upstream slow or down: the form again with a retry hint, 503
/// - anything else: redirect to the client with the error
pub async fn login_submit_handler(
    State(state): State<IdpState>,
    Path(connector_id): Path<String>,
    Query(query): Query<LoginQuery>,
    Form(form): Form<LoginForm>,
) -> Response {
    let credentials = Credentials::Password {
        username: form.username,
        password: form.password,
    };

    let result = state
        .server
        .connector_login(&connector_id, &query.session_id, credentials)
        .await;

    match result {
        Ok(location) => found(&location),
        Err(AuthError::Connector(ConnectorError::InvalidCredentials)) => {
            rerender(
                &state,
                &connector_id,
                &query.session_id,
                StatusCode::UNAUTHORIZED,
                "Invalid username or password",
            )
            .await
        }
        Err(error) if error.is_retryable() => {
            rerender(
                &state,
                &connector_id,
                &query.session_id,
                StatusCode::SERVICE_UNAVAILABLE,
                "The login service is temporarily unavailable, please try again",
            )
            .await
        }
        Err(error) => fail_login(&state, &query.session_id, error).await,
    }
}

/// Handler for `GET /auth/{connector_id}/callback`.
pub async fn callback_handler(
    State(state): State<IdpState>,
    Path(connector_id): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(session_id) = query.state.filter(|s| !s.is_empty()) else {
        return error_response(&AuthError::invalid_request("state is required"));
    };

    if let Some(upstream_error) = query.error {
        let description = query.error_description.unwrap_or_default();
        tracing::info!(
            connector_id = %connector_id,
            error = %upstream_error,
            "Upstream provider returned an error"
        );
        let error = AuthError::access_denied(format!(
            "upstream provider: {upstream_error} {description}"
        ));
        return fail_login(&state, &session_id, error).await;
    }

    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return error_response(&AuthError::invalid_request("code is required"));
    };

    let credentials = Credentials::AuthorizationCode {
        code,
        session_id: session_id.clone(),
    };
    match state
        .server
        .connector_login(&connector_id, &session_id, credentials)
        .await
    {
        Ok(location) => found(&location),
        Err(error) if error.is_retryable() => error_response(&error),
        Err(error) => fail_login(&state, &session_id, error).await,
    }
}

async fn render_form(
    state: &IdpState,
    connector_id: &str,
    session_id: &str,
    error: Option<&str>,
) -> AuthResult<String> {
    let server = &state.server;
    let session = server.login_session(connector_id, session_id).await?;
    let connector = server
        .connectors()
        .get(connector_id)
        .filter(|c| c.kind().uses_password_form())
        .ok_or_else(|| {
            AuthError::invalid_request(format!("connector '{connector_id}' has no login form"))
        })?;

    let client = server.clients().metadata(&session.client_id).await?;
    let client_name = client.name.as_deref().unwrap_or(&client.id);
    Ok(render_login_form(connector.display_name(), client_name, error))
}

async fn rerender(
    state: &IdpState,
    connector_id: &str,
    session_id: &str,
    status: StatusCode,
    message: &str,
) -> Response {
    match render_form(state, connector_id, session_id, Some(message)).await {
        Ok(html) => (status, Html(html)).into_response(),
        Err(error) => error_response(&error),
    }
}

/// Sends the browser back to the client with `error`. Without a live
/// session there is nowhere safe to redirect, so the error is shown.
async fn fail_login(state: &IdpState, session_id: &str, error: AuthError) -> Response {
    let is_session_error = matches!(
        error,
        AuthError::SessionNotFound | AuthError::SessionExpired | AuthError::InvalidState { .. }
    );
    if is_session_error {
        return error_response(&error);
    }

    match state.server.login_failure_redirect(session_id, &error).await {
        Ok(location) => {
            if error.is_server_error() {
                tracing::error!(error = %error, "Login failed");
            }
            found(&location)
        }
        Err(_) => error_response(&error),
    }
}
