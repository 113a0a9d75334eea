//! Upstream identity connectors.
//!
//! A connector verifies a user against some authority and reports a
//! [`RemoteIdentity`]. It never decides which local user that is.
//!
//! | Kind | Credentials | Login page |
//! |------|-------------|------------|
//! | [`LocalConnector`] | password | form served by this server |
//! | [`LdapConnector`] | password | form served by this server |
//! | [`OidcConnector`] | authorization code | upstream provider |

mod error;
pub mod ldap;
mod local;
mod oidc;
mod registry;

pub use error::ConnectorError;
pub use ldap::{LdapConfig, LdapConnector};
pub use local::{LocalConfig, LocalConnector};
pub use oidc::{OidcConfig, OidcConnector};
pub use registry::{ConnectorHealth, ConnectorRegistry};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, AuthResult};
use crate::storage::{PasswordStorage, UserStorage};
use crate::types::RemoteIdentity;

// =============================================================================
// Connector Trait
// =============================================================================

/// What the user proves to a connector.
#[derive(Clone)]
pub enum Credentials {
    /// Username and password typed into this server's login form.
    Password { username: String, password: String },
    /// Code returned by an upstream provider to the callback endpoint.
    AuthorizationCode { code: String, session_id: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::AuthorizationCode { session_id, .. } => f
                .debug_struct("AuthorizationCode")
                .field("session_id", session_id)
                .finish_non_exhaustive(),
        }
    }
}

/// How a connector collects credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    Local,
    Ldap,
    Oidc,
}

impl ConnectorKind {
    /// Returns `true` if the user types a password into this server.
    #[must_use]
    pub fn uses_password_form(&self) -> bool {
        matches!(self, Self::Local | Self::Ldap)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Ldap => "ldap",
            Self::Oidc => "oidc",
        }
    }
}

/// An upstream authority users can log in with.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connector ID, unique within the registry.
    fn id(&self) -> &str;

    /// Human readable name for login pages.
    fn display_name(&self) -> &str;

    /// How this connector collects credentials.
    fn kind(&self) -> ConnectorKind;

    /// Where to send the browser to log in for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be built, for example because
    /// upstream discovery failed.
    async fn login_url(&self, session_id: &str) -> Result<Url, ConnectorError>;

    /// Verifies credentials and returns the identity they prove.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` for wrong credentials, a retryable
    /// error when the upstream is slow or down, and a fatal error otherwise.
    async fn authenticate(&self, credentials: Credentials)
    -> Result<RemoteIdentity, ConnectorError>;

    /// Checks that the upstream is reachable.
    ///
    /// # Errors
    ///
    /// Returns the reason the connector cannot serve logins right now.
    async fn healthy(&self) -> Result<(), ConnectorError>;

    /// Releases pooled resources at shutdown.
    async fn close(&self) {}
}

// =============================================================================
// Configuration
// =============================================================================

/// Connector configuration, tagged by `type`.
///
/// ```toml
/// [[connectors]]
/// type = "local"
/// id = "local"
/// name = "Email"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectorConfig {
    Local(LocalConfig),
    Ldap(LdapConfig),
    Oidc(OidcConfig),
}

impl ConnectorConfig {
    /// The configured connector ID.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Local(c) => &c.id,
            Self::Ldap(c) => &c.id,
            Self::Oidc(c) => &c.id,
        }
    }

    /// Builds the connector.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the settings are unusable.
    pub fn build(
        &self,
        issuer: &Url,
        users: Arc<dyn UserStorage>,
        passwords: Arc<dyn PasswordStorage>,
    ) -> AuthResult<Arc<dyn Connector>> {
        let connector: Arc<dyn Connector> = match self {
            Self::Local(config) => Arc::new(LocalConnector::new(
                config.clone(),
                issuer.clone(),
                users,
                passwords,
            )),
            Self::Ldap(config) => Arc::new(LdapConnector::from_config(config.clone(), issuer)?),
            Self::Oidc(config) => Arc::new(OidcConnector::new(config.clone(), issuer)?),
        };
        Ok(connector)
    }
}

/// Builds `{issuer}/auth/{connector_id}/{leaf}`.
///
/// # Errors
///
/// Returns a configuration error if the result is not a valid URL.
pub fn endpoint_url(issuer: &Url, connector_id: &str, leaf: &str) -> AuthResult<Url> {
    let base = issuer.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/auth/{connector_id}/{leaf}")).map_err(|e| {
        AuthError::configuration(format!("connector '{connector_id}' endpoint: {e}"))
    })
}

fn default_timeout() -> std::time::Duration {
    std::time::Duration::from_secs(10)
}
