//! ID token minting.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::Validation;
use time::OffsetDateTime;

use super::claims::{Audience, IdTokenClaims};
use crate::error::AuthResult;
use crate::keys::KeyManager;

/// Who an ID token is about.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub sub: String,
    pub name: String,
    /// `(address, verified)`, included only when the `email` scope was
    /// granted.
    pub email: Option<(String, bool)>,
}

/// Mints and verifies ID tokens with the key manager's keys.
pub struct IdTokenIssuer {
    keys: Arc<KeyManager>,
    issuer: String,
    ttl: Duration,
}

impl IdTokenIssuer {
    /// Creates an issuer that signs tokens valid for `ttl`.
    #[must_use]
    pub fn new(keys: Arc<KeyManager>, issuer: impl Into<String>, ttl: Duration) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            ttl,
        }
    }

    /// Token lifetime in seconds, as reported in `expires_in`.
    #[must_use]
    pub fn expires_in(&self) -> u64 {
        self.ttl.as_secs()
    }

    /// Signs an ID token for `subject`, addressed to `client_id` and any
    /// `peers` that trust it.
    ///
    /// # Errors
    ///
    /// Returns `KeyManagerUninitialized` when there is no usable signing key.
    pub fn issue(
        &self,
        subject: TokenSubject,
        client_id: &str,
        peers: &[String],
        nonce: Option<String>,
    ) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc();
        let aud = Audience::new(client_id, peers);
        let azp = aud.is_multiple().then(|| client_id.to_string());
        let (email, email_verified) = match subject.email {
            Some((address, verified)) => (Some(address), Some(verified)),
            None => (None, None),
        };

        let claims = IdTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.sub,
            aud,
            azp,
            exp: (now + self.ttl).unix_timestamp(),
            iat: now.unix_timestamp(),
            name: subject.name,
            email,
            email_verified,
            nonce,
        };

        let signer = self.keys.active_signer()?;
        let token = signer.sign(&claims)?;
        tracing::debug!(kid = %signer.kid(), sub = %claims.sub, client_id = %client_id, "ID token issued");
        Ok(token)
    }

    /// Verifies a token this issuer signed for `audience`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGrant` for a bad signature, issuer, audience or an
    /// expired token.
    pub fn verify(&self, token: &str, audience: &str) -> AuthResult<IdTokenClaims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let data = self.keys.verify::<IdTokenClaims>(token, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::keys::{SigningAlgorithm, SigningKeyPair};

    fn issuer() -> IdTokenIssuer {
        let keys = Arc::new(KeyManager::new(Duration::from_secs(3600)));
        keys.rotate(
            SigningKeyPair::generate(SigningAlgorithm::ES384).unwrap(),
            OffsetDateTime::now_utc() + time::Duration::hours(1),
        )
        .unwrap();
        IdTokenIssuer::new(keys, "https://id.example.com", Duration::from_secs(600))
    }

    fn subject() -> TokenSubject {
        TokenSubject {
            sub: "user-1".to_string(),
            name: "Jane".to_string(),
            email: Some(("jane@example.com".to_string(), true)),
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = issuer();
        let token = issuer
            .issue(subject(), "web", &[], Some("n-0S6".to_string()))
            .unwrap();

        let claims = issuer.verify(&token, "web").unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.aud, Audience::One("web".to_string()));
        assert_eq!(claims.azp, None);
        assert_eq!(claims.email.as_deref(), Some("jane@example.com"));
        assert_eq!(claims.nonce.as_deref(), Some("n-0S6"));
        assert_eq!(claims.exp - claims.iat, 600);
    }

    #[test]
    fn test_peer_audience_sets_azp() {
        let issuer = issuer();
        let token = issuer
            .issue(subject(), "web", &["api".to_string()], None)
            .unwrap();

        let claims = issuer.verify(&token, "api").unwrap();
        assert!(claims.aud.contains("web"));
        assert_eq!(claims.azp.as_deref(), Some("web"));
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let issuer = issuer();
        let token = issuer.issue(subject(), "web", &[], None).unwrap();
        assert!(matches!(
            issuer.verify(&token, "other").unwrap_err(),
            AuthError::InvalidGrant { .. }
        ));
    }

    #[test]
    fn test_uninitialized_keys() {
        let keys = Arc::new(KeyManager::new(Duration::from_secs(60)));
        let issuer = IdTokenIssuer::new(keys, "https://id.example.com", Duration::from_secs(60));
        assert!(matches!(
            issuer.issue(subject(), "web", &[], None).unwrap_err(),
            AuthError::KeyManagerUninitialized { .. }
        ));
    }
}
