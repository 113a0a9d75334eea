//! Local password connector.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Connector, ConnectorError, ConnectorKind, Credentials, endpoint_url};
use crate::error::AuthError;
use crate::password::verify_password;
use crate::storage::{PasswordStorage, UserStorage};
use crate::types::RemoteIdentity;

/// Local connector configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalConfig {
    pub id: String,
    #[serde(default = "default_name")]
    pub name: String,
}

fn default_name() -> String {
    "Email".to_string()
}

/// Authenticates users against password hashes held by this server.
///
/// The username is an email address or a user ID. The remote identity ID
/// is the local user ID.
pub struct LocalConnector {
    config: LocalConfig,
    issuer: Url,
    users: Arc<dyn UserStorage>,
    passwords: Arc<dyn PasswordStorage>,
}

impl LocalConnector {
    #[must_use]
    pub fn new(
        config: LocalConfig,
        issuer: Url,
        users: Arc<dyn UserStorage>,
        passwords: Arc<dyn PasswordStorage>,
    ) -> Self {
        Self {
            config,
            issuer,
            users,
            passwords,
        }
    }

    fn storage_error(&self, err: AuthError) -> ConnectorError {
        ConnectorError::unavailable(&self.config.id, err.to_string())
    }
}

#[async_trait]
impl Connector for LocalConnector {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn display_name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Local
    }

    async fn login_url(&self, session_id: &str) -> Result<Url, ConnectorError> {
        let mut url = endpoint_url(&self.issuer, &self.config.id, "login")
            .map_err(|e| ConnectorError::misconfigured(&self.config.id, e.to_string()))?;
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
        if username.is_empty() || password.is_empty() {
            return Err(ConnectorError::InvalidCredentials);
        }

        let user = match self
            .users
            .get_by_email(&username)
            .await
            .map_err(|e| self.storage_error(e))?
        {
            Some(user) => Some(user),
            None => self
                .users
                .get(&username)
                .await
                .map_err(|e| self.storage_error(e))?,
        };
        let user = user.ok_or(ConnectorError::InvalidCredentials)?;

        let info = self
            .passwords
            .get_password(&user.id)
            .await
            .map_err(|e| self.storage_error(e))?
            .ok_or(ConnectorError::InvalidCredentials)?;

        let hash = info.password_hash;
        let matched = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| ConnectorError::upstream(&self.config.id, e.to_string()))?
            .map_err(|e| ConnectorError::misconfigured(&self.config.id, e.to_string()))?;
        if !matched {
            return Err(ConnectorError::InvalidCredentials);
        }

        let mut identity = RemoteIdentity::new(user.id, user.display_name);
        identity.email = user.email;
        Ok(identity)
    }

    async fn healthy(&self) -> Result<(), ConnectorError> {
        Ok(())
    }
}
