//! Authorization endpoint handler.

use axum::{
    extract::{Query, State},
    response::Response,
};

use super::{IdpState, error_response, found};
use crate::oauth::{AuthorizationFailure, AuthorizationRequest};

/// Handler for `GET /auth`.
///
/// Redirects to the connector's login page. Errors about the client or
/// its redirect URI are answered directly; later errors are redirected to
/// the client.
pub async fn authorize_handler(
    State(state): State<IdpState>,
    Query(request): Query<AuthorizationRequest>,
) -> Response {
    tracing::debug!(
        client_id = ?request.client_id,
        connector_id = ?request.connector_id,
        "Processing authorization request"
    );

    match state.server.authorize(request).await {
        Ok(login_url) => found(&login_url),
        Err(AuthorizationFailure::Direct(error)) => {
            tracing::info!(error = %error, "Authorization request rejected");
            error_response(&error)
        }
        Err(AuthorizationFailure::Redirect { error, location }) => {
            if error.is_server_error() {
                tracing::error!(error = %error, "Authorization request failed");
            } else {
                tracing::info!(error = %error, "Authorization request rejected, redirecting");
            }
            found(&location)
        }
    }
}
