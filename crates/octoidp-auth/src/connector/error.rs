//! Error types for upstream connectors.

/// Errors reported by a connector while authenticating a user or checking
/// its own health.
///
/// Every variant is either retryable (the upstream is slow or unreachable
/// and the user may simply try again) or fatal (the credentials or the
/// upstream response are wrong). See [`ConnectorError::is_retryable`].
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// The user supplied wrong credentials.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The upstream did not answer within the configured timeout.
    #[error("Connector {connector} timed out")]
    Timeout {
        /// The connector ID.
        connector: String,
    },

    /// The upstream could not be reached or refused the connection.
    #[error("Connector {connector} unavailable: {message}")]
    Unavailable {
        /// The connector ID.
        connector: String,
        /// Description of the failure.
        message: String,
    },

    /// The connector cannot use the kind of credentials it was given.
    #[error("Connector {connector} does not accept these credentials")]
    UnsupportedCredentials {
        /// The connector ID.
        connector: String,
    },

    /// The upstream answered with something the connector cannot accept.
    #[error("Upstream error from {connector}: {message}")]
    Upstream {
        /// The connector ID.
        connector: String,
        /// Description of the failure.
        message: String,
    },

    /// The connector configuration is unusable.
    #[error("Connector {connector} misconfigured: {message}")]
    Misconfigured {
        /// The connector ID.
        connector: String,
        /// Description of the problem.
        message: String,
    },
}

impl ConnectorError {
    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(connector: impl Into<String>) -> Self {
        Self::Timeout {
            connector: connector.into(),
        }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(connector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            connector: connector.into(),
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedCredentials` error.
    #[must_use]
    pub fn unsupported_credentials(connector: impl Into<String>) -> Self {
        Self::UnsupportedCredentials {
            connector: connector.into(),
        }
    }

    /// Creates a new `Upstream` error.
    #[must_use]
    pub fn upstream(connector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            connector: connector.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Misconfigured` error.
    #[must_use]
    pub fn misconfigured(connector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Misconfigured {
            connector: connector.into(),
            message: message.into(),
        }
    }

    /// Classifies an HTTP client failure.
    ///
    /// Timeouts, connection failures and upstream 5xx responses are
    /// retryable. Anything else is treated as a bad upstream response.
    #[must_use]
    pub fn from_http(connector: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::timeout(connector);
        }
        if err.is_connect() || err.status().is_some_and(|s| s.is_server_error()) {
            return Self::unavailable(connector, err.to_string());
        }
        Self::upstream(connector, err.to_string())
    }

    /// Returns `true` if the same login may succeed when retried later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ConnectorError::timeout("ldap").is_retryable());
        assert!(ConnectorError::unavailable("ldap", "connection refused").is_retryable());

        assert!(!ConnectorError::InvalidCredentials.is_retryable());
        assert!(!ConnectorError::unsupported_credentials("local").is_retryable());
        assert!(!ConnectorError::upstream("google", "bad id_token").is_retryable());
        assert!(!ConnectorError::misconfigured("ldap", "empty host").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = ConnectorError::timeout("corp-ldap");
        assert_eq!(err.to_string(), "Connector corp-ldap timed out");

        let err = ConnectorError::upstream("google", "nonce mismatch");
        assert!(err.to_string().contains("nonce mismatch"));
    }
}
