//! LDAP connector.
//!
//! A login runs on one pooled connection:
//!
//! 1. bind as the service account
//! 2. search `base_dn` for the user with `user_filter`
//! 3. bind as the found DN with the typed password
//!
//! The pool talks to the directory through [`LdapDialer`] and
//! [`LdapSession`], implemented with `ldap3` in [`Ldap3Dialer`].

mod conn;
mod pool;

pub use conn::Ldap3Dialer;
pub use pool::{LdapPool, PooledSession};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Connector, ConnectorError, ConnectorKind, Credentials, default_timeout, endpoint_url};
use crate::error::AuthResult;
use crate::types::RemoteIdentity;

// =============================================================================
// Directory Abstraction
// =============================================================================

/// One search result.
#[derive(Debug, Clone, Default)]
pub struct LdapEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// First value of `attr`, if any.
    #[must_use]
    pub fn first(&self, attr: &str) -> Option<&str> {
        self.attrs
            .get(attr)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// An open directory connection.
#[async_trait]
pub trait LdapSession: Send {
    /// Binds as `dn`. Result code 49 maps to `InvalidCredentials`.
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<(), ConnectorError>;

    /// Subtree search under `base`.
    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<LdapEntry>, ConnectorError>;

    /// Cheap liveness probe used before a connection is reused.
    async fn is_alive(&mut self) -> bool;

    /// Unbinds and closes the connection.
    async fn close(&mut self);
}

/// Opens directory connections.
#[async_trait]
pub trait LdapDialer: Send + Sync {
    async fn dial(&self) -> Result<Box<dyn LdapSession>, ConnectorError>;
}

// =============================================================================
// Configuration
// =============================================================================

/// Connection pool limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LdapPoolConfig {
    /// Maximum connections in use at once.
    pub max_open: usize,
    /// Maximum connections kept open while unused.
    pub max_idle: usize,
    /// How long a login waits for a free connection.
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for LdapPoolConfig {
    fn default() -> Self {
        Self {
            max_open: 10,
            max_idle: 4,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// LDAP connector configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LdapConfig {
    pub id: String,
    #[serde(default = "default_name")]
    pub name: String,
    /// `ldap://` or `ldaps://` URL.
    pub host: String,
    /// Service account used for user lookups.
    pub bind_dn: String,
    pub bind_password: String,
    /// Search base for users.
    pub base_dn: String,
    /// Filter template; `{username}` is replaced by the escaped username.
    #[serde(default = "default_user_filter")]
    pub user_filter: String,
    #[serde(default = "default_id_attr")]
    pub id_attr: String,
    #[serde(default = "default_name_attr")]
    pub name_attr: String,
    #[serde(default = "default_email_attr")]
    pub email_attr: String,
    /// Applies to every directory operation.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub pool: LdapPoolConfig,
}

fn default_name() -> String {
    "LDAP".to_string()
}
fn default_user_filter() -> String {
    "(uid={username})".to_string()
}
fn default_id_attr() -> String {
    "uid".to_string()
}
fn default_name_attr() -> String {
    "cn".to_string()
}
fn default_email_attr() -> String {
    "mail".to_string()
}

// =============================================================================
// Connector
// =============================================================================

/// Authenticates users with an LDAP bind.
pub struct LdapConnector {
    config: LdapConfig,
    login_url: Url,
    pool: LdapPool,
}

impl LdapConnector {
    /// Builds a connector dialing `config.host` with `ldap3`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty host or a bad issuer.
    pub fn from_config(config: LdapConfig, issuer: &Url) -> AuthResult<Self> {
        if config.host.trim().is_empty() {
            return Err(crate::error::AuthError::configuration(format!(
                "ldap connector '{}' needs a host",
                config.id
            )));
        }
        let dialer = Arc::new(Ldap3Dialer::new(&config.id, &config.host, config.timeout));
        Self::with_dialer(config, issuer, dialer)
    }

    /// Builds a connector over any dialer.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the login URL cannot be built.
    pub fn with_dialer(
        config: LdapConfig,
        issuer: &Url,
        dialer: Arc<dyn LdapDialer>,
    ) -> AuthResult<Self> {
        let login_url = endpoint_url(issuer, &config.id, "login")?;
        let pool = LdapPool::new(&config.id, dialer, &config.pool);
        Ok(Self {
            config,
            login_url,
            pool,
        })
    }

    /// The connection pool.
    #[must_use]
    pub fn pool(&self) -> &LdapPool {
        &self.pool
    }

    /// Binds as the service account. A rejected bind is a configuration
    /// problem, not a failed login.
    async fn bind_service(&self, session: &mut dyn LdapSession) -> Result<(), ConnectorError> {
        session
            .simple_bind(&self.config.bind_dn, &self.config.bind_password)
            .await
            .map_err(|e| match e {
                ConnectorError::InvalidCredentials => {
                    ConnectorError::misconfigured(&self.config.id, "service account bind rejected")
                }
                other => other,
            })
    }

    async fn bind_user(
        &self,
        session: &mut dyn LdapSession,
        username: &str,
        password: &str,
    ) -> Result<RemoteIdentity, ConnectorError> {
        let id = &self.config.id;
        self.bind_service(session).await?;

        let filter = self
            .config
            .user_filter
            .replace("{username}", &ldap3::ldap_escape(username));
        let attrs = [
            self.config.id_attr.as_str(),
            self.config.name_attr.as_str(),
            self.config.email_attr.as_str(),
        ];
        let mut entries = session.search(&self.config.base_dn, &filter, &attrs).await?;

        let entry = match entries.len() {
            0 => return Err(ConnectorError::InvalidCredentials),
            1 => entries.remove(0),
            n => {
                return Err(ConnectorError::upstream(
                    id,
                    format!("user filter matched {n} entries"),
                ));
            }
        };

        session.simple_bind(&entry.dn, password).await?;

        let remote_id = entry
            .first(&self.config.id_attr)
            .ok_or_else(|| {
                ConnectorError::upstream(id, format!("entry has no {}", self.config.id_attr))
            })?
            .to_string();
        let name = entry
            .first(&self.config.name_attr)
            .unwrap_or(username)
            .to_string();

        let mut identity = RemoteIdentity::new(remote_id, name);
        identity.email = entry.first(&self.config.email_attr).map(str::to_string);
        Ok(identity)
    }
}

#[async_trait]
impl Connector for LdapConnector {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn display_name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Ldap
    }

    async fn login_url(&self, session_id: &str) -> Result<Url, ConnectorError> {
        let mut url = self.login_url.clone();
        url.query_pairs_mut().append_pair("session_id", session_id);
        Ok(url)
    }

    async fn authenticate(
        &self,
        credentials: Credentials,
    ) -> Result<RemoteIdentity, ConnectorError> {
        let Credentials::Password { username, password } = credentials else {
            return Err(ConnectorError::unsupported_credentials(&self.config.id));
        };
        // An empty password would be an anonymous bind.
        if username.is_empty() || password.is_empty() {
            return Err(ConnectorError::InvalidCredentials);
        }

        let mut conn = self.pool.get().await?;
        let result = tokio::time::timeout(
            self.config.timeout,
            self.bind_user(conn.session(), &username, &password),
        )
        .await
        .unwrap_or_else(|_| Err(ConnectorError::timeout(&self.config.id)));

        match &result {
            Ok(_) | Err(ConnectorError::InvalidCredentials) => conn.release().await,
            Err(_) => conn.discard().await,
        }
        result
    }

    async fn healthy(&self) -> Result<(), ConnectorError> {
        let mut conn = self.pool.get().await?;
        let result = tokio::time::timeout(self.config.timeout, self.bind_service(conn.session()))
        .await
        .unwrap_or_else(|_| Err(ConnectorError::timeout(&self.config.id)));

        match result {
            Ok(()) => {
                conn.release().await;
                Ok(())
            }
            Err(e) => {
                conn.discard().await;
                Err(e)
            }
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
