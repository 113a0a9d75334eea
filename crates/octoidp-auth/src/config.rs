//! Identity provider configuration.
//!
//! These types are deserialized from the `[auth]` section of the server
//! configuration. Every struct uses `#[serde(default)]`, so a missing
//! section or key falls back to the values documented on each field.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::{AuthError, AuthResult};
use crate::keys::SigningAlgorithm;

/// Root identity provider configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// issuer = "https://id.example.com"
/// auto_register = true
///
/// [auth.keys]
/// algorithm = "RS256"
/// rotation_interval = "6h"
/// key_ttl = "12h"
///
/// [auth.refresh_tokens]
/// secrets = ["<64 hex chars, newest first>"]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdpConfig {
    /// Issuer URL. Used as the `iss` claim and as the base of every
    /// advertised endpoint.
    pub issuer: String,

    /// Create a local user on first login when no user is linked to the
    /// remote identity.
    pub auto_register: bool,

    /// How often every connector's health check runs.
    #[serde(with = "humantime_serde")]
    pub connector_health_interval: Duration,

    /// Signing key rotation.
    pub keys: KeyConfig,

    /// Login session lifetimes.
    pub sessions: SessionConfig,

    /// ID token settings.
    pub tokens: TokenConfig,

    /// Refresh token encryption.
    pub refresh_tokens: RefreshTokenConfig,
}

impl Default for IdpConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:5556".to_string(),
            auto_register: false,
            connector_health_interval: Duration::from_secs(30),
            keys: KeyConfig::default(),
            sessions: SessionConfig::default(),
            tokens: TokenConfig::default(),
            refresh_tokens: RefreshTokenConfig::default(),
        }
    }
}

impl IdpConfig {
    /// Parses the issuer URL.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the issuer is not an absolute URL.
    pub fn issuer_url(&self) -> AuthResult<Url> {
        Url::parse(&self.issuer)
            .map_err(|e| AuthError::configuration(format!("invalid issuer '{}': {e}", self.issuer)))
    }

    /// Checks the cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> AuthResult<()> {
        self.issuer_url()?;

        if self.keys.key_ttl <= self.keys.rotation_interval {
            return Err(AuthError::configuration(
                "keys.key_ttl must be longer than keys.rotation_interval",
            ));
        }
        if self.sessions.key_ttl > self.sessions.session_ttl {
            return Err(AuthError::configuration(
                "sessions.key_ttl must not exceed sessions.session_ttl",
            ));
        }
        if self.connector_health_interval.is_zero() {
            return Err(AuthError::configuration(
                "connector_health_interval must be positive",
            ));
        }
        if self.tokens.id_token_ttl.is_zero() {
            return Err(AuthError::configuration("tokens.id_token_ttl must be positive"));
        }

        self.refresh_tokens.decode_secrets()?;
        Ok(())
    }
}

/// Signing key rotation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Algorithm for newly generated keys.
    pub algorithm: SigningAlgorithm,

    /// How often a new key replaces the active one.
    #[serde(with = "humantime_serde")]
    pub rotation_interval: Duration,

    /// How long a freshly generated key may sign.
    /// Must exceed `rotation_interval` so there is never a signing gap.
    #[serde(with = "humantime_serde")]
    pub key_ttl: Duration,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            algorithm: SigningAlgorithm::RS256,
            rotation_interval: Duration::from_secs(6 * 3600),
            key_ttl: Duration::from_secs(12 * 3600),
        }
    }
}

/// Login session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Absolute lifetime of a login session.
    #[serde(with = "humantime_serde")]
    pub session_ttl: Duration,

    /// Absolute lifetime of a session key (authorization code).
    #[serde(with = "humantime_serde")]
    pub key_ttl: Duration,

    /// How often expired sessions and keys are swept from storage.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(300),
            key_ttl: Duration::from_secs(120),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// ID token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Lifetime of issued ID tokens. Also the grace window during which a
    /// rotated-out key keeps verifying.
    #[serde(with = "humantime_serde")]
    pub id_token_ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            id_token_ttl: Duration::from_secs(3600),
        }
    }
}

/// Refresh token configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshTokenConfig {
    /// AES-256 keys as 64 hex characters, newest first. New tokens are
    /// sealed with the first one; every listed key can open old tokens.
    pub secrets: Vec<String>,
}

impl RefreshTokenConfig {
    /// Decodes the configured secrets.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the list is empty or a secret is
    /// not exactly 32 bytes of hex.
    pub fn decode_secrets(&self) -> AuthResult<Vec<[u8; 32]>> {
        if self.secrets.is_empty() {
            return Err(AuthError::configuration(
                "refresh_tokens.secrets must contain at least one secret",
            ));
        }

        self.secrets
            .iter()
            .enumerate()
            .map(|(idx, secret)| {
                let bytes = hex::decode(secret.trim()).map_err(|e| {
                    AuthError::configuration(format!("refresh_tokens.secrets[{idx}] is not hex: {e}"))
                })?;
                <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
                    AuthError::configuration(format!(
                        "refresh_tokens.secrets[{idx}] must be 32 bytes, got {}",
                        bytes.len()
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> IdpConfig {
        IdpConfig {
            refresh_tokens: RefreshTokenConfig {
                secrets: vec!["11".repeat(32)],
            },
            ..IdpConfig::default()
        }
    }

    #[test]
    fn test_defaults_validate_once_secret_set() {
        assert!(IdpConfig::default().validate().is_err());
        valid().validate().unwrap();
    }

    #[test]
    fn test_rejects_short_secret() {
        let mut config = valid();
        config.refresh_tokens.secrets = vec!["abcd".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn test_rejects_key_ttl_shorter_than_rotation() {
        let mut config = valid();
        config.keys.key_ttl = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_issuer() {
        let mut config = valid();
        config.issuer = "not a url".to_string();
        assert!(matches!(
            config.validate().unwrap_err(),
            AuthError::Configuration { .. }
        ));
    }

    #[test]
    fn test_parse_humantime_durations() {
        let config: IdpConfig = from_json(
            r#"{"issuer":"https://id.example.com","sessions":{"session_ttl":"10m"},"keys":{"algorithm":"ES384"}}"#,
        );
        assert_eq!(config.sessions.session_ttl, Duration::from_secs(600));
        assert_eq!(config.sessions.key_ttl, Duration::from_secs(120));
        assert_eq!(config.keys.algorithm, SigningAlgorithm::ES384);
    }

    fn from_json(json: &str) -> IdpConfig {
        serde_json::from_str(json).unwrap()
    }
}
