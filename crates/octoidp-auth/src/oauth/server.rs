//! The authorization server: drives one OIDC flow from `/auth` to `/token`.

use std::sync::Arc;

use url::Url;

use super::authorize::{
    AuthorizationFailure, AuthorizationRequest, code_redirect, error_redirect,
};
use super::scope;
use super::token::{RevocationRequest, TokenRequest, TokenResponse};
use crate::client::{ClientCredentials, ClientRegistry};
use crate::config::IdpConfig;
use crate::connector::{ConnectorKind, ConnectorRegistry, Credentials};
use crate::error::{AuthError, AuthResult};
use crate::keys::{KeyManager, SigningAlgorithm};
use crate::refresh::{RefreshTokenManager, SecretRing};
use crate::session::{SessionManager, log_prefix};
use crate::storage::{RefreshTokenStorage, SessionStorage, UserStorage};
use crate::token::{IdTokenIssuer, TokenSubject};
use crate::types::{GrantType, NewSession, RemoteIdentity, Session, User};

/// Storage backends the server runs on.
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStorage>,
    pub refresh_tokens: Arc<dyn RefreshTokenStorage>,
    pub users: Arc<dyn UserStorage>,
}

/// OIDC authorization server.
///
/// Every collaborator is injected; the server holds no global state. Each
/// HTTP request maps onto exactly one method here, and every method is one
/// session transition (or one grant).
pub struct AuthorizationServer {
    issuer: Url,
    issuer_base: String,
    signing_algorithm: SigningAlgorithm,
    auto_register: bool,
    keys: Arc<KeyManager>,
    clients: Arc<ClientRegistry>,
    connectors: Arc<ConnectorRegistry>,
    users: Arc<dyn UserStorage>,
    sessions: SessionManager,
    refresh_tokens: RefreshTokenManager,
    tokens: IdTokenIssuer,
}

impl AuthorizationServer {
    /// Wires the server together.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid issuer or unusable
    /// refresh token secrets.
    pub fn new(
        config: &IdpConfig,
        keys: Arc<KeyManager>,
        clients: Arc<ClientRegistry>,
        connectors: Arc<ConnectorRegistry>,
        stores: Stores,
    ) -> AuthResult<Self> {
        let issuer = config.issuer_url()?;
        let issuer_base = issuer.as_str().trim_end_matches('/').to_string();
        let ring = SecretRing::new(&config.refresh_tokens.decode_secrets()?)?;

        Ok(Self {
            tokens: IdTokenIssuer::new(
                Arc::clone(&keys),
                issuer_base.clone(),
                config.tokens.id_token_ttl,
            ),
            issuer,
            issuer_base,
            signing_algorithm: config.keys.algorithm,
            auto_register: config.auto_register,
            keys,
            clients,
            connectors,
            users: stores.users,
            sessions: SessionManager::new(stores.sessions, &config.sessions),
            refresh_tokens: RefreshTokenManager::new(stores.refresh_tokens, ring),
        })
    }

    #[must_use]
    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    /// The issuer without a trailing slash: the `iss` claim and the prefix
    /// of every advertised endpoint.
    #[must_use]
    pub fn issuer_base(&self) -> &str {
        &self.issuer_base
    }

    /// Algorithm new signing keys are generated with.
    #[must_use]
    pub fn signing_algorithm(&self) -> SigningAlgorithm {
        self.signing_algorithm
    }

    #[must_use]
    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    #[must_use]
    pub fn connectors(&self) -> &Arc<ConnectorRegistry> {
        &self.connectors
    }

    #[must_use]
    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn refresh_tokens(&self) -> &RefreshTokenManager {
        &self.refresh_tokens
    }

    // =========================================================================
    // Authorization endpoint
    // =========================================================================

    /// Validates an authorization request, opens a session and returns the
    /// connector login URL to send the browser to.
    ///
    /// # Errors
    ///
    /// Client and redirect URI failures come back as
    /// [`AuthorizationFailure::Direct`]; everything after that as a
    /// redirect to the client.
    pub async fn authorize(
        &self,
        request: AuthorizationRequest,
    ) -> Result<Url, AuthorizationFailure> {
        let client_id = request
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AuthorizationFailure::Direct(AuthError::invalid_request("client_id is required"))
            })?;
        let client = self
            .clients
            .metadata(client_id)
            .await
            .map_err(AuthorizationFailure::Direct)?;
        let redirect_uri = self
            .clients
            .validate_redirect_uri(&client, request.redirect_uri.as_deref())
            .map_err(AuthorizationFailure::Direct)?;

        let state = request.state.as_deref();
        let fail = |error: AuthError| AuthorizationFailure::Redirect {
            location: error_redirect(&redirect_uri, &error, state),
            error,
        };

        match request.response_type.as_deref() {
            Some("code") => {}
            Some(other) => return Err(fail(AuthError::unsupported_response_type(other))),
            None => return Err(fail(AuthError::invalid_request("response_type is required"))),
        }

        let scopes = scope::parse_authorization(request.scope.as_deref()).map_err(fail)?;

        let connector_id = match request.connector_id.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => self
                .connectors
                .sole()
                .ok_or_else(|| fail(AuthError::invalid_request("connector_id is required")))?,
        };
        let connector = self.connectors.available(&connector_id).map_err(fail)?;

        let session_id = self
            .sessions
            .new_session(NewSession {
                connector_id,
                client_id: client.id.clone(),
                client_state: request.state.clone(),
                redirect_uri: redirect_uri.clone(),
                nonce: request.nonce,
                register: request.register.unwrap_or(false),
                scopes,
            })
            .await
            .map_err(fail)?;

        connector
            .login_url(&session_id)
            .await
            .map_err(|e| fail(AuthError::from(e)))
    }

    // =========================================================================
    // Connector login and callback
    // =========================================================================

    /// Returns the live session a login page belongs to, checking that it
    /// was opened for `connector_id`.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`/`SessionExpired`, or `SessionNotFound` when
    /// the session belongs to another connector.
    pub async fn login_session(&self, connector_id: &str, session_id: &str) -> AuthResult<Session> {
        let session = self.sessions.get(session_id).await?;
        if session.connector_id != connector_id {
            return Err(AuthError::SessionNotFound);
        }
        Ok(session)
    }

    /// Verifies `credentials` with the session's connector and, on success,
    /// finishes the login. Returns the client redirect carrying the code.
    ///
    /// # Errors
    ///
    /// Returns the connector error unchanged so the caller can tell a wrong
    /// password from an unreachable upstream. Session and user failures are
    /// returned as well.
    pub async fn connector_login(
        &self,
        connector_id: &str,
        session_id: &str,
        credentials: Credentials,
    ) -> AuthResult<Url> {
        let session = self.login_session(connector_id, session_id).await?;
        let connector = self
            .connectors
            .get(connector_id)
            .ok_or(AuthError::SessionNotFound)?;

        let identity = connector.authenticate(credentials).await.map_err(|e| {
            tracing::info!(
                session = %log_prefix(&session.id),
                connector_id = %connector_id,
                error = %e,
                "Connector login failed"
            );
            AuthError::from(e)
        })?;

        self.complete_login(&session.id, identity).await
    }

    /// Attaches a verified identity, resolves the local user and answers
    /// the session. Returns the client redirect carrying the code.
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied` when no user may be resolved or the user is
    /// disabled, or the session transition error.
    pub async fn complete_login(&self, session_id: &str, identity: RemoteIdentity) -> AuthResult<Url> {
        self.sessions
            .attach_remote_identity(session_id, identity.clone())
            .await?;
        let session = self.sessions.get(session_id).await?;

        let user = self.resolve_user(&session, &identity).await?;
        if user.disabled {
            return Err(AuthError::access_denied("user is disabled"));
        }

        self.sessions.attach_user(session_id, &user.id).await?;
        self.sessions.mark_answered(session_id).await?;
        let key = self.sessions.new_session_key(session_id).await?;

        tracing::info!(
            session = %log_prefix(session_id),
            client_id = %session.client_id,
            connector_id = %session.connector_id,
            user_id = %user.id,
            "Login completed"
        );
        Ok(code_redirect(
            &session.redirect_uri,
            &key.key,
            session.client_state.as_deref(),
        ))
    }

    /// Builds the client redirect for a login that cannot succeed.
    ///
    /// # Errors
    ///
    /// Returns the session lookup error when there is no live session to
    /// redirect for.
    pub async fn login_failure_redirect(
        &self,
        session_id: &str,
        error: &AuthError,
    ) -> AuthResult<Url> {
        let session = self.sessions.get(session_id).await?;
        Ok(error_redirect(
            &session.redirect_uri,
            error,
            session.client_state.as_deref(),
        ))
    }

    async fn resolve_user(&self, session: &Session, identity: &RemoteIdentity) -> AuthResult<User> {
        let kind = self
            .connectors
            .get(&session.connector_id)
            .map(|c| c.kind());

        // Local identities are the local users themselves.
        if kind == Some(ConnectorKind::Local) {
            return self
                .users
                .get(&identity.id)
                .await?
                .ok_or_else(|| AuthError::access_denied("no such user"));
        }

        if let Some(user) = self
            .users
            .get_by_remote_identity(&session.connector_id, &identity.id)
            .await?
        {
            return Ok(user);
        }

        if !(session.register || self.auto_register) {
            return Err(AuthError::access_denied(
                "no local user is linked to this identity",
            ));
        }

        let mut user = User::new(identity.name.clone());
        user.email = identity.email.clone();
        user.remote_identities
            .push((session.connector_id.clone(), identity.id.clone()));
        self.users.create(&user).await?;

        tracing::info!(
            user_id = %user.id,
            connector_id = %session.connector_id,
            "User registered from remote identity"
        );
        Ok(user)
    }

    // =========================================================================
    // Token endpoint
    // =========================================================================

    /// Handles a token request for any supported grant.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest`/`UnsupportedGrantType` for a bad grant type,
    /// otherwise the grant's own errors.
    pub async fn token(
        &self,
        credentials: &ClientCredentials,
        request: TokenRequest,
    ) -> AuthResult<TokenResponse> {
        let grant_type = request
            .grant_type
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("grant_type is required"))?;

        match GrantType::parse(grant_type) {
            Some(GrantType::AuthorizationCode) => self.exchange_code(credentials, request).await,
            Some(GrantType::RefreshToken) => self.refresh(credentials, request).await,
            Some(GrantType::ClientCredentials) => {
                self.client_credentials(credentials, request).await
            }
            None => Err(AuthError::unsupported_grant_type(grant_type)),
        }
    }

    /// `authorization_code` grant.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` on failed client authentication and an
    /// `invalid_grant` class error for a bad, reused or foreign code.
    pub async fn exchange_code(
        &self,
        credentials: &ClientCredentials,
        request: TokenRequest,
    ) -> AuthResult<TokenResponse> {
        let client = self.clients.authenticate(credentials, true).await?;
        let code = request
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::invalid_request("code is required"))?;

        let session = self.sessions.exchange_key(code).await?;
        if session.client_id != client.id {
            tracing::warn!(
                session = %log_prefix(&session.id),
                client_id = %client.id,
                "Code presented by a client it was not issued to"
            );
            return Err(AuthError::invalid_grant("code was issued to another client"));
        }
        if let Some(raw) = request.redirect_uri.as_deref() {
            let matches = Url::parse(raw).is_ok_and(|uri| uri == session.redirect_uri);
            if !matches {
                return Err(AuthError::invalid_grant("redirect_uri does not match"));
            }
        }

        let user_id = session
            .user_id
            .as_deref()
            .ok_or_else(|| AuthError::internal("answered session without a user"))?;
        let user = self.active_user(user_id).await?;

        let id_token = self.mint_for_user(&user, &client.id, &session.scopes, session.nonce.clone())?;
        let mut response =
            TokenResponse::new(id_token, self.tokens.expires_in()).with_scopes(&session.scopes);

        if scope::contains(&session.scopes, scope::OFFLINE_ACCESS) {
            let refresh = self
                .refresh_tokens
                .create_with_scopes(&user.id, &client.id, &session.scopes)
                .await?;
            response = response.with_refresh_token(refresh);
        }
        Ok(response)
    }

    /// `refresh_token` grant. Re-reads the user so the new ID token
    /// reflects current state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient`, an `invalid_grant` class error for an
    /// unusable token, `InvalidScope` when asking for more than was granted,
    /// or `AccessDenied` for a disabled user.
    pub async fn refresh(
        &self,
        credentials: &ClientCredentials,
        request: TokenRequest,
    ) -> AuthResult<TokenResponse> {
        let client = self.clients.authenticate(credentials, true).await?;
        let token = request
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::invalid_request("refresh_token is required"))?;

        let record = self.refresh_tokens.verify_grant(&client.id, token).await?;
        let user = self.active_user(&record.user_id).await?;

        let scopes = match request.scope.as_deref() {
            Some(raw) => {
                let requested = scope::split(raw);
                if let Some(extra) = requested.iter().find(|s| !record.scopes.contains(s)) {
                    return Err(AuthError::invalid_scope(format!(
                        "scope '{extra}' was not granted"
                    )));
                }
                requested
            }
            None => record.scopes.clone(),
        };

        let id_token = self.mint_for_user(&user, &client.id, &scopes, None)?;
        tracing::debug!(token_id = record.id, client_id = %client.id, "Refresh token redeemed");
        Ok(TokenResponse::new(id_token, self.tokens.expires_in()).with_scopes(&scopes))
    }

    /// `client_credentials` grant. The token is about the client itself.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` unless a confidential client authenticates
    /// with its secret, or `InvalidScope` for unknown scopes.
    pub async fn client_credentials(
        &self,
        credentials: &ClientCredentials,
        request: TokenRequest,
    ) -> AuthResult<TokenResponse> {
        let client = self.clients.authenticate(credentials, false).await?;
        if !client.is_confidential() {
            return Err(AuthError::unauthorized_client(
                "client_credentials requires a confidential client",
            ));
        }

        let mut scopes = scope::split(request.scope.as_deref().unwrap_or(scope::OPENID));
        scope::ensure_supported(&scopes)?;
        scopes.retain(|s| s != scope::OFFLINE_ACCESS);

        let subject = TokenSubject {
            sub: client.id.clone(),
            name: client.id.clone(),
            email: None,
        };
        let id_token = self.mint(subject, &client.id, &scopes, None)?;
        Ok(TokenResponse::new(id_token, self.tokens.expires_in()).with_scopes(&scopes))
    }

    /// Token revocation (RFC 7009).
    ///
    /// Succeeds once the client authenticates, whether or not the token was
    /// valid.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient`, `InvalidRequest` without a token, or a
    /// storage error.
    pub async fn revoke(
        &self,
        credentials: &ClientCredentials,
        request: RevocationRequest,
    ) -> AuthResult<()> {
        let client = self.clients.authenticate(credentials, true).await?;
        let token = request
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::invalid_request("token is required"))?;

        let revoked = match self.refresh_tokens.verify(&client.id, token).await {
            Ok(user_id) => self.refresh_tokens.revoke(&user_id, token).await,
            Err(err) => Err(err),
        };

        match revoked {
            Ok(()) => {
                tracing::info!(client_id = %client.id, "Refresh token revoked");
                Ok(())
            }
            Err(err) if err.is_server_error() => Err(err),
            Err(_) => Ok(()),
        }
    }

    async fn active_user(&self, user_id: &str) -> AuthResult<User> {
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("user no longer exists"))?;
        if user.disabled {
            return Err(AuthError::access_denied("user is disabled"));
        }
        Ok(user)
    }

    fn mint_for_user(
        &self,
        user: &User,
        client_id: &str,
        scopes: &[String],
        nonce: Option<String>,
    ) -> AuthResult<String> {
        let email = if scope::contains(scopes, scope::EMAIL) {
            user.email
                .as_ref()
                .map(|address| (address.clone(), user.email_verified))
        } else {
            None
        };

        let subject = TokenSubject {
            sub: user.id.clone(),
            name: user.display_name.clone(),
            email,
        };
        self.mint(subject, client_id, scopes, nonce)
    }

    fn mint(
        &self,
        subject: TokenSubject,
        client_id: &str,
        scopes: &[String],
        nonce: Option<String>,
    ) -> AuthResult<String> {
        let peers: Vec<String> = scope::requested_peers(scopes)
            .into_iter()
            .filter(|peer| peer != client_id && self.clients.is_trusted_peer(peer, client_id))
            .collect();
        self.tokens.issue(subject, client_id, &peers, nonce)
    }
}
