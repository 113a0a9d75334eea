//! `ldap3` implementation of the directory abstraction.

use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};

use super::{LdapDialer, LdapEntry, LdapSession};
use crate::connector::ConnectorError;

/// LDAP result code for a failed bind.
const INVALID_CREDENTIALS: u32 = 49;

/// Dials `ldap://` / `ldaps://` URLs.
pub struct Ldap3Dialer {
    connector: String,
    url: String,
    timeout: Duration,
}

impl Ldap3Dialer {
    #[must_use]
    pub fn new(connector: &str, url: &str, timeout: Duration) -> Self {
        Self {
            connector: connector.to_string(),
            url: url.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl LdapDialer for Ldap3Dialer {
    async fn dial(&self) -> Result<Box<dyn LdapSession>, ConnectorError> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.url)
            .await
            .map_err(|e| ConnectorError::unavailable(&self.connector, e.to_string()))?;

        let connector = self.connector.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::warn!(connector_id = %connector, error = %e, "LDAP connection driver error");
            }
        });

        Ok(Box::new(Ldap3Session {
            connector: self.connector.clone(),
            ldap,
            timeout: self.timeout,
        }))
    }
}

/// Maps a bind result code.
fn bind_outcome(connector: &str, rc: u32, text: &str) -> Result<(), ConnectorError> {
    match rc {
        0 => Ok(()),
        INVALID_CREDENTIALS => Err(ConnectorError::InvalidCredentials),
        rc => Err(ConnectorError::upstream(
            connector,
            format!("bind failed with result code {rc}: {text}"),
        )),
    }
}

struct Ldap3Session {
    connector: String,
    ldap: Ldap,
    timeout: Duration,
}

impl Ldap3Session {
    fn io_error(&self, err: ldap3::LdapError) -> ConnectorError {
        match err {
            ldap3::LdapError::Timeout { .. } => ConnectorError::timeout(&self.connector),
            other => ConnectorError::unavailable(&self.connector, other.to_string()),
        }
    }
}

#[async_trait]
impl LdapSession for Ldap3Session {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<(), ConnectorError> {
        let result = self
            .ldap
            .with_timeout(self.timeout)
            .simple_bind(dn, password)
            .await
            .map_err(|e| self.io_error(e))?;

        bind_outcome(&self.connector, result.rc, &result.text)
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<LdapEntry>, ConnectorError> {
        let (entries, _) = self
            .ldap
            .with_timeout(self.timeout)
            .search(base, Scope::Subtree, filter, attrs.to_vec())
            .await
            .map_err(|e| self.io_error(e))?
            .success()
            .map_err(|e| ConnectorError::upstream(&self.connector, e.to_string()))?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry {
                dn: entry.dn,
                attrs: entry.attrs,
            })
            .collect())
    }

    async fn is_alive(&mut self) -> bool {
        // Root DSE read; any answer proves the socket works.
        self.ldap
            .with_timeout(self.timeout)
            .search("", Scope::Base, "(objectClass=*)", vec!["1.1"])
            .await
            .is_ok()
    }

    async fn close(&mut self) {
        if let Err(e) = self.ldap.unbind().await {
            tracing::debug!(connector_id = %self.connector, error = %e, "LDAP unbind failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_result_codes() {
        assert!(bind_outcome("corp", 0, "").is_ok());
        assert!(matches!(
            bind_outcome("corp", 49, "invalid credentials"),
            Err(ConnectorError::InvalidCredentials)
        ));

        let err = bind_outcome("corp", 53, "unwilling to perform").unwrap_err();
        assert!(matches!(err, ConnectorError::Upstream { .. }));
        assert!(!err.is_retryable());
    }
}
