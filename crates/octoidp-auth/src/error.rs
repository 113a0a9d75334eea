//! Identity provider error types.
//!
//! Every fallible operation in this crate returns [`AuthError`]. The enum is
//! the single place where domain failures are classified into the OAuth 2.0
//! error taxonomy, so HTTP handlers never decide on their own which wire
//! code a failure maps to.

use std::fmt;

use crate::connector::ConnectorError;

/// Errors that can occur while running the identity provider.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    // ------------------------------------------------------------------
    // Client request errors
    // ------------------------------------------------------------------
    /// The request is missing a parameter or is otherwise malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// Client authentication failed or the client is not registered.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The client is not allowed to use the requested grant or response.
    #[error("Unauthorized client: {message}")]
    UnauthorizedClient {
        /// Description of the restriction.
        message: String,
    },

    /// The requested scope is unknown or malformed.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of why the scope is invalid.
        message: String,
    },

    /// The grant is invalid for a reason other than session or token state.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The requested response type is not supported.
    #[error("Unsupported response type: {response_type}")]
    UnsupportedResponseType {
        /// The unsupported response type.
        response_type: String,
    },

    /// The requested grant type is not supported.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// The login was refused.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of why access was denied.
        message: String,
    },

    /// The selected connector cannot take new logins right now.
    #[error("Temporarily unavailable: {message}")]
    TemporarilyUnavailable {
        /// Description of the unavailable component.
        message: String,
    },

    // ------------------------------------------------------------------
    // Session and session key errors
    // ------------------------------------------------------------------
    /// No session exists under the given ID.
    #[error("Session not found")]
    SessionNotFound,

    /// The session exists but its absolute expiry has passed.
    #[error("Session expired")]
    SessionExpired,

    /// The session key is unknown, already exchanged, or expired.
    #[error("Session key not found")]
    KeyNotFound,

    /// A different remote identity is already attached to the session.
    #[error("A different identity is already attached to the session")]
    IdentityAlreadyAttached,

    /// The session is not in the state required by the transition.
    #[error("Invalid session state: {message}")]
    InvalidState {
        /// Description of the attempted transition.
        message: String,
    },

    // ------------------------------------------------------------------
    // Refresh token errors
    // ------------------------------------------------------------------
    /// The refresh token is malformed, unknown, tampered or revoked.
    #[error("Invalid refresh token")]
    InvalidToken,

    /// The client ID is empty or does not match the token binding.
    #[error("Invalid client ID")]
    InvalidClientId,

    /// The user ID is empty or does not match the token binding.
    #[error("Invalid user ID")]
    InvalidUserId,

    // ------------------------------------------------------------------
    // Key management
    // ------------------------------------------------------------------
    /// There is no usable signing key yet.
    #[error("Key manager uninitialized: {message}")]
    KeyManagerUninitialized {
        /// Description of the missing key state.
        message: String,
    },

    // ------------------------------------------------------------------
    // Upstream and infrastructure errors
    // ------------------------------------------------------------------
    /// An upstream connector failed.
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// An error occurred while storing or retrieving data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `UnauthorizedClient` error.
    #[must_use]
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedResponseType` error.
    #[must_use]
    pub fn unsupported_response_type(response_type: impl Into<String>) -> Self {
        Self::UnsupportedResponseType {
            response_type: response_type.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `TemporarilyUnavailable` error.
    #[must_use]
    pub fn temporarily_unavailable(message: impl Into<String>) -> Self {
        Self::TemporarilyUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidState` error.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a new `KeyManagerUninitialized` error.
    #[must_use]
    pub fn key_manager_uninitialized(message: impl Into<String>) -> Self {
        Self::KeyManagerUninitialized {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Connector(err) => !err.is_retryable(),
            Self::TemporarilyUnavailable { .. }
            | Self::KeyManagerUninitialized { .. }
            | Self::Storage { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => false,
            _ => true,
        }
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::KeyManagerUninitialized { .. }
                | Self::Storage { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns `true` if the caller may retry the same operation later.
    ///
    /// Only upstream timeouts, unreachable connectors and a key manager
    /// waiting for its first rotation qualify. Session, code and token
    /// failures are terminal for the request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connector(err) => err.is_retryable(),
            Self::TemporarilyUnavailable { .. } | Self::KeyManagerUninitialized { .. } => true,
            _ => false,
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest { .. }
            | Self::InvalidScope { .. }
            | Self::UnsupportedResponseType { .. }
            | Self::UnsupportedGrantType { .. } => ErrorCategory::Validation,
            Self::InvalidClient { .. } | Self::UnauthorizedClient { .. } => ErrorCategory::Client,
            Self::InvalidGrant { .. }
            | Self::SessionNotFound
            | Self::SessionExpired
            | Self::KeyNotFound
            | Self::IdentityAlreadyAttached
            | Self::InvalidState { .. } => ErrorCategory::Session,
            Self::InvalidToken | Self::InvalidClientId | Self::InvalidUserId => {
                ErrorCategory::RefreshToken
            }
            Self::AccessDenied { .. } => ErrorCategory::Authentication,
            Self::TemporarilyUnavailable { .. } | Self::Connector(_) => ErrorCategory::Upstream,
            Self::KeyManagerUninitialized { .. } => ErrorCategory::Signing,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OAuth 2.0 error code for this error.
    ///
    /// Session, code and refresh token failures all collapse into
    /// `invalid_grant` so the wire response never tells a caller which
    /// part of the grant was wrong.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidClient { .. } => "invalid_client",
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::UnsupportedResponseType { .. } => "unsupported_response_type",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::InvalidGrant { .. }
            | Self::SessionNotFound
            | Self::SessionExpired
            | Self::KeyNotFound
            | Self::IdentityAlreadyAttached
            | Self::InvalidState { .. }
            | Self::InvalidToken
            | Self::InvalidClientId
            | Self::InvalidUserId => "invalid_grant",
            Self::AccessDenied { .. } => "access_denied",
            Self::TemporarilyUnavailable { .. } => "temporarily_unavailable",
            Self::Connector(err) if err.is_retryable() => "temporarily_unavailable",
            Self::Connector(_) => "access_denied",
            Self::KeyManagerUninitialized { .. }
            | Self::Storage { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => "server_error",
        }
    }

    /// Returns the description safe to show to the caller.
    ///
    /// Grant failures get one fixed text and server failures get another.
    /// Anything more specific only goes to the logs.
    #[must_use]
    pub fn public_description(&self) -> String {
        match self.oauth_error_code() {
            "invalid_grant" => "The provided grant is invalid, expired or revoked".to_string(),
            "server_error" => "The server encountered an unexpected error".to_string(),
            "temporarily_unavailable" => {
                "The identity provider is temporarily unavailable, please retry".to_string()
            }
            "invalid_client" => "Client authentication failed".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Categories of identity provider errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Request validation errors.
    Validation,
    /// Client registration or authentication errors.
    Client,
    /// Login session and authorization code errors.
    Session,
    /// Refresh token errors.
    RefreshToken,
    /// End-user authentication errors.
    Authentication,
    /// Upstream connector errors.
    Upstream,
    /// Signing key errors.
    Signing,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Client => write!(f, "client"),
            Self::Session => write!(f, "session"),
            Self::RefreshToken => write!(f, "refresh_token"),
            Self::Authentication => write!(f, "authentication"),
            Self::Upstream => write!(f, "upstream"),
            Self::Signing => write!(f, "signing"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Result type alias for identity provider operations.
pub type AuthResult<T> = Result<T, AuthError>;
