//! The key manager: one active signer plus verify-only predecessors.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use jsonwebtoken::{TokenData, Validation};
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;

use super::pair::{Jwks, KeyError, SigningKeyPair};
use crate::error::{AuthError, AuthResult};

/// The active signing key together with the instant it stops signing.
#[derive(Clone)]
struct ActiveKey {
    pair: Arc<SigningKeyPair>,
    valid_until: OffsetDateTime,
}

/// A demoted key kept only to verify tokens it already signed.
#[derive(Clone)]
struct RetiredKey {
    pair: Arc<SigningKeyPair>,
    verify_until: OffsetDateTime,
}

/// Immutable snapshot of the key set. Rotation builds a new one and swaps
/// the pointer.
#[derive(Clone, Default)]
struct KeySet {
    active: Option<ActiveKey>,
    retired: Vec<RetiredKey>,
}

/// Holds the signing keys of the identity provider.
///
/// Readers (`active_signer`, `jwks`, `verify`) load an [`ArcSwap`]
/// snapshot and never block. Writers serialize on a mutex that is held only
/// while the next snapshot is assembled and stored; key generation happens
/// before the lock is taken.
pub struct KeyManager {
    keys: ArcSwap<KeySet>,
    rotate_lock: Mutex<()>,
    grace: Duration,
}

impl KeyManager {
    /// Creates an empty key manager.
    ///
    /// `grace` is how long a key keeps verifying after it stops signing.
    /// It should be at least the ID token lifetime.
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        Self {
            keys: ArcSwap::from_pointee(KeySet::default()),
            rotate_lock: Mutex::new(()),
            grace,
        }
    }

    /// Returns the key that signs new tokens.
    ///
    /// # Errors
    ///
    /// Returns `KeyManagerUninitialized` if no key was ever installed or the
    /// active key is past its `valid_until`.
    pub fn active_signer(&self) -> AuthResult<Arc<SigningKeyPair>> {
        let keys = self.keys.load();
        let active = keys
            .active
            .as_ref()
            .ok_or_else(|| AuthError::key_manager_uninitialized("no signing key installed"))?;

        if OffsetDateTime::now_utc() >= active.valid_until {
            return Err(AuthError::key_manager_uninitialized(format!(
                "signing key {} expired and no rotation has replaced it",
                active.pair.kid()
            )));
        }
        Ok(Arc::clone(&active.pair))
    }

    /// Returns every key whose signatures may still be valid, active first.
    #[must_use]
    pub fn verification_keys(&self) -> Vec<Arc<SigningKeyPair>> {
        let now = OffsetDateTime::now_utc();
        let keys = self.keys.load();

        let mut out = Vec::with_capacity(keys.retired.len() + 1);
        if let Some(active) = &keys.active {
            if now < active.valid_until + self.grace {
                out.push(Arc::clone(&active.pair));
            }
        }
        out.extend(
            keys.retired
                .iter()
                .filter(|k| now < k.verify_until)
                .map(|k| Arc::clone(&k.pair)),
        );
        out
    }

    /// Installs `pair` as the active signer until `valid_until`.
    ///
    /// The previous active key is demoted to verify-only for the grace
    /// window. Retired keys whose window has elapsed are dropped.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `valid_until` is not in the future.
    pub fn rotate(&self, pair: SigningKeyPair, valid_until: OffsetDateTime) -> AuthResult<()> {
        let now = OffsetDateTime::now_utc();
        if valid_until <= now {
            return Err(AuthError::configuration(
                "a new signing key must be valid in the future",
            ));
        }

        let kid = pair.kid().to_string();
        let guard = self
            .rotate_lock
            .lock()
            .map_err(|_| AuthError::internal("key rotation lock poisoned"))?;

        let current = self.keys.load_full();
        let mut retired: Vec<RetiredKey> = current
            .retired
            .iter()
            .filter(|k| now < k.verify_until)
            .cloned()
            .collect();

        if let Some(previous) = &current.active {
            let stopped_signing = previous.valid_until.min(now);
            retired.insert(
                0,
                RetiredKey {
                    pair: Arc::clone(&previous.pair),
                    verify_until: stopped_signing + self.grace,
                },
            );
        }

        self.keys.store(Arc::new(KeySet {
            active: Some(ActiveKey {
                pair: Arc::new(pair),
                valid_until,
            }),
            retired,
        }));
        drop(guard);

        tracing::info!(kid = %kid, valid_until = %valid_until, "Signing key rotated");
        Ok(())
    }

    /// Returns the public JWK set of all verification keys.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: self
                .verification_keys()
                .iter()
                .map(|pair| pair.to_jwk())
                .collect(),
        }
    }

    /// Returns when the active key stops signing, if there is one.
    #[must_use]
    pub fn active_valid_until(&self) -> Option<OffsetDateTime> {
        self.keys.load().active.as_ref().map(|a| a.valid_until)
    }

    /// Returns `true` once a signing key has been installed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.keys.load().active.is_some()
    }

    /// Signs `claims` with the active key.
    ///
    /// # Errors
    ///
    /// Returns `KeyManagerUninitialized` without a usable key, or an
    /// internal error if signing fails.
    pub fn sign<T: Serialize>(&self, claims: &T) -> AuthResult<String> {
        let signer = self.active_signer()?;
        signer.sign(claims).map_err(AuthError::from)
    }

    /// Verifies a token against the key named by its `kid` header.
    ///
    /// The algorithm in `validation` is replaced with the key's own.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is unreadable, no verification key
    /// matches, or validation fails.
    pub fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        validation: &Validation,
    ) -> Result<TokenData<T>, KeyError> {
        let header = jsonwebtoken::decode_header(token)?;
        let kid = header.kid.ok_or_else(|| KeyError::KeyNotFound {
            kid: String::new(),
        })?;

        let pair = self
            .verification_keys()
            .into_iter()
            .find(|pair| pair.kid() == kid)
            .ok_or(KeyError::KeyNotFound { kid })?;

        let mut validation = validation.clone();
        validation.algorithms = vec![pair.algorithm().to_jwt_algorithm()];
        pair.verify(token, &validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SigningAlgorithm;

    #[derive(Debug, Serialize, serde::Deserialize)]
    struct Claims {
        sub: String,
        exp: i64,
    }

    fn new_pair() -> SigningKeyPair {
        SigningKeyPair::generate(SigningAlgorithm::ES384).unwrap()
    }

    fn in_minutes(minutes: i64) -> OffsetDateTime {
        OffsetDateTime::now_utc() + time::Duration::minutes(minutes)
    }

    fn lenient() -> Validation {
        let mut validation = Validation::default();
        validation.validate_aud = false;
        validation
    }

    #[test]
    fn test_uninitialized_manager_cannot_sign() {
        let manager = KeyManager::new(Duration::from_secs(600));
        assert!(!manager.is_initialized());

        let err = manager.active_signer().unwrap_err();
        assert!(matches!(err, AuthError::KeyManagerUninitialized { .. }));
        assert!(manager.jwks().keys.is_empty());
    }

    #[test]
    fn test_rotation_demotes_previous_key() {
        let manager = KeyManager::new(Duration::from_secs(600));
        manager.rotate(new_pair(), in_minutes(60)).unwrap();
        let first = manager.active_signer().unwrap().kid().to_string();

        let claims = Claims {
            sub: "u".to_string(),
            exp: in_minutes(5).unix_timestamp(),
        };
        let old_token = manager.sign(&claims).unwrap();

        manager.rotate(new_pair(), in_minutes(60)).unwrap();
        let second = manager.active_signer().unwrap().kid().to_string();
        assert_ne!(first, second);

        let kids: Vec<String> = manager.jwks().keys.into_iter().map(|k| k.kid).collect();
        assert_eq!(kids, vec![second, first]);

        let verified: TokenData<Claims> = manager.verify(&old_token, &lenient()).unwrap();
        assert_eq!(verified.claims.sub, "u");
    }

    #[test]
    fn test_retired_key_pruned_after_grace() {
        let manager = KeyManager::new(Duration::ZERO);
        manager.rotate(new_pair(), in_minutes(60)).unwrap();
        let old_token = manager
            .sign(&Claims {
                sub: "u".to_string(),
                exp: in_minutes(5).unix_timestamp(),
            })
            .unwrap();

        manager.rotate(new_pair(), in_minutes(60)).unwrap();
        assert_eq!(manager.verification_keys().len(), 1);

        let result: Result<TokenData<Claims>, _> = manager.verify(&old_token, &lenient());
        assert!(matches!(result.unwrap_err(), KeyError::KeyNotFound { .. }));
    }

    #[test]
    fn test_rotation_rejects_past_expiry() {
        let manager = KeyManager::new(Duration::from_secs(60));
        let err = manager.rotate(new_pair(), in_minutes(-1)).unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
        assert!(!manager.is_initialized());
    }

    #[test]
    fn test_concurrent_readers_during_rotation() {
        let manager = Arc::new(KeyManager::new(Duration::from_secs(600)));
        manager.rotate(new_pair(), in_minutes(60)).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        assert!(manager.active_signer().is_ok());
                        assert!(!manager.jwks().keys.is_empty());
                    }
                })
            })
            .collect();

        for _ in 0..3 {
            manager.rotate(new_pair(), in_minutes(60)).unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(manager.jwks().keys.len(), 4);
    }
}
