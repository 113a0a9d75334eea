//! Session manager.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use super::{log_prefix, random_id};
use crate::config::SessionConfig;
use crate::error::{AuthError, AuthResult};
use crate::storage::SessionStorage;
use crate::types::{NewSession, RemoteIdentity, Session, SessionKey, SessionState};

/// Attempts before a contended transition gives up.
const CAS_ATTEMPTS: usize = 8;

/// Drives sessions through
/// `New -> IdentityAttached -> UserAttached -> Answered -> Exchanged`.
///
/// Every transition re-reads the session, checks expiry and the current
/// state, and commits with a compare-and-swap on the state it read. A
/// transition that loses a race re-reads and re-evaluates, so concurrent
/// callbacks for one session cannot both win.
#[derive(Clone)]
pub struct SessionManager {
    storage: Arc<dyn SessionStorage>,
    session_ttl: Duration,
    key_ttl: Duration,
}

impl SessionManager {
    /// Creates a manager over `storage` using the configured TTLs.
    #[must_use]
    pub fn new(storage: Arc<dyn SessionStorage>, config: &SessionConfig) -> Self {
        Self {
            storage,
            session_ttl: config.session_ttl,
            key_ttl: config.key_ttl,
        }
    }

    /// Creates a session in state `New` and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the session cannot be stored.
    pub async fn new_session(&self, params: NewSession) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc();
        let session = Session {
            id: random_id(),
            connector_id: params.connector_id,
            client_id: params.client_id,
            client_state: params.client_state,
            redirect_uri: params.redirect_uri,
            nonce: params.nonce,
            register: params.register,
            scopes: params.scopes,
            state: SessionState::New,
            identity: None,
            user_id: None,
            created_at: now,
            expires_at: now + self.session_ttl,
        };

        self.storage.create(&session).await?;
        tracing::debug!(
            session = %log_prefix(&session.id),
            client_id = %session.client_id,
            connector_id = %session.connector_id,
            "Session created"
        );
        Ok(session.id)
    }

    /// Returns a live session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or `SessionExpired`.
    pub async fn get(&self, id: &str) -> AuthResult<Session> {
        let session = self
            .storage
            .find(id)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        match session.state_at(OffsetDateTime::now_utc()) {
            SessionState::Expired => Err(AuthError::SessionExpired),
            SessionState::Exchanged => Err(AuthError::SessionNotFound),
            _ => Ok(session),
        }
    }

    /// Attaches the identity a connector verified.
    ///
    /// Repeating the call with the identical identity succeeds and returns
    /// the same ID.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, `SessionExpired`, or
    /// `IdentityAlreadyAttached` when a different identity is attached.
    pub async fn attach_remote_identity(
        &self,
        id: &str,
        identity: RemoteIdentity,
    ) -> AuthResult<String> {
        let session = self
            .transition(id, |session| match &session.identity {
                Some(attached) if *attached == identity => Ok(None),
                Some(_) => Err(AuthError::IdentityAlreadyAttached),
                None if session.state == SessionState::New => {
                    let mut next = session.clone();
                    next.identity = Some(identity.clone());
                    next.state = SessionState::IdentityAttached;
                    Ok(Some(next))
                }
                None => Err(AuthError::invalid_state(format!(
                    "cannot attach identity in state {}",
                    session.state
                ))),
            })
            .await?;
        Ok(session.id)
    }

    /// Attaches the local user the remote identity resolved to.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, `SessionExpired`, or `InvalidState` when
    /// no identity is attached yet or a different user is.
    pub async fn attach_user(&self, id: &str, user_id: &str) -> AuthResult<String> {
        let session = self
            .transition(id, |session| match (&session.user_id, session.state) {
                (Some(attached), _) if attached == user_id => Ok(None),
                (Some(_), _) => Err(AuthError::invalid_state(
                    "a different user is already attached",
                )),
                (None, SessionState::IdentityAttached) => {
                    let mut next = session.clone();
                    next.user_id = Some(user_id.to_string());
                    next.state = SessionState::UserAttached;
                    Ok(Some(next))
                }
                (None, state) => Err(AuthError::invalid_state(format!(
                    "cannot attach user in state {state}"
                ))),
            })
            .await?;
        Ok(session.id)
    }

    /// Marks a session with an attached user as answered.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, `SessionExpired`, or `InvalidState` when
    /// no user is attached.
    pub async fn mark_answered(&self, id: &str) -> AuthResult<String> {
        let session = self
            .transition(id, |session| match session.state {
                SessionState::Answered => Ok(None),
                SessionState::UserAttached => {
                    let mut next = session.clone();
                    next.state = SessionState::Answered;
                    Ok(Some(next))
                }
                state => Err(AuthError::invalid_state(format!(
                    "cannot answer session in state {state}"
                ))),
            })
            .await?;
        Ok(session.id)
    }

    /// Mints a one-time key for an answered session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, `SessionExpired`, or `InvalidState` when
    /// the session is not answered.
    pub async fn new_session_key(&self, id: &str) -> AuthResult<SessionKey> {
        let session = self.get(id).await?;
        if session.state != SessionState::Answered {
            return Err(AuthError::invalid_state(format!(
                "cannot mint a key in state {}",
                session.state
            )));
        }

        let key = SessionKey {
            key: random_id(),
            session_id: session.id,
            expires_at: OffsetDateTime::now_utc() + self.key_ttl,
        };
        self.storage.create_key(&key).await?;
        tracing::debug!(session = %log_prefix(&key.session_id), "Session key minted");
        Ok(key)
    }

    /// Redeems a session key and returns its session, exactly once.
    ///
    /// The key is consumed whether or not the exchange succeeds.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` for unknown, expired or already redeemed keys,
    /// and `SessionExpired` when the session outlived its TTL.
    pub async fn exchange_key(&self, key: &str) -> AuthResult<Session> {
        let now = OffsetDateTime::now_utc();
        let key = self
            .storage
            .consume_key(key)
            .await?
            .ok_or(AuthError::KeyNotFound)?;
        if key.is_expired_at(now) {
            return Err(AuthError::KeyNotFound);
        }

        let session = self
            .storage
            .find(&key.session_id)
            .await?
            .ok_or(AuthError::KeyNotFound)?;
        match session.state_at(now) {
            SessionState::Answered => {}
            SessionState::Expired => return Err(AuthError::SessionExpired),
            _ => return Err(AuthError::KeyNotFound),
        }

        let mut exchanged = session.clone();
        exchanged.state = SessionState::Exchanged;
        if !self
            .storage
            .update(&exchanged, SessionState::Answered)
            .await?
        {
            return Err(AuthError::KeyNotFound);
        }

        if let Err(e) = self.storage.delete(&exchanged.id).await {
            tracing::warn!(
                session = %log_prefix(&exchanged.id),
                error = %e,
                "Failed to delete exchanged session"
            );
        }
        tracing::debug!(session = %log_prefix(&exchanged.id), "Session key exchanged");
        Ok(exchanged)
    }

    /// Removes expired sessions and keys from storage.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the sweep fails.
    pub async fn cleanup_expired(&self) -> AuthResult<u64> {
        self.storage
            .cleanup_expired(OffsetDateTime::now_utc())
            .await
    }

    /// Applies `decide` to the current session and commits its result with
    /// a compare-and-swap. `Ok(None)` from `decide` means the session already
    /// is where the caller wants it.
    async fn transition<F>(&self, id: &str, decide: F) -> AuthResult<Session>
    where
        F: Fn(&Session) -> AuthResult<Option<Session>>,
    {
        for _ in 0..CAS_ATTEMPTS {
            let current = self.get(id).await?;
            let Some(next) = decide(&current)? else {
                return Ok(current);
            };

            if self.storage.update(&next, current.state).await? {
                tracing::debug!(
                    session = %log_prefix(id),
                    from = %current.state,
                    to = %next.state,
                    "Session transition"
                );
                return Ok(next);
            }
        }

        Err(AuthError::invalid_state("session modified concurrently"))
    }
}
