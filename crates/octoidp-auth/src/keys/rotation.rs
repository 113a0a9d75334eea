//! Time-driven key rotation.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::watch;

use super::{KeyManager, SigningKeyPair};
use crate::config::KeyConfig;
use crate::error::{AuthError, AuthResult};

/// Generates a new signing key every `rotation_interval` and installs it
/// in the [`KeyManager`].
#[derive(Clone)]
pub struct KeyRotator {
    manager: Arc<KeyManager>,
    config: KeyConfig,
}

impl KeyRotator {
    /// Creates a rotator for `manager`.
    #[must_use]
    pub fn new(manager: Arc<KeyManager>, config: KeyConfig) -> Self {
        Self { manager, config }
    }

    /// Generates and installs a key immediately, returning its `kid`.
    ///
    /// Key generation runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns an internal error if generation fails. The previous key set
    /// stays untouched in that case.
    pub async fn rotate_now(&self) -> AuthResult<String> {
        let algorithm = self.config.algorithm;
        let pair = tokio::task::spawn_blocking(move || SigningKeyPair::generate(algorithm))
            .await
            .map_err(|e| AuthError::internal(format!("key generation task failed: {e}")))??;

        let kid = pair.kid().to_string();
        self.manager
            .rotate(pair, OffsetDateTime::now_utc() + self.config.key_ttl)?;
        Ok(kid)
    }

    /// Rotates on every interval tick until `shutdown` flips to `true`.
    ///
    /// A failed rotation is logged and retried on the next tick; the
    /// current key keeps signing until its own expiry.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.rotation_interval);
        // The first tick fires immediately; startup already installed a key.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.rotate_now().await {
                        Ok(kid) => tracing::debug!(kid = %kid, "Scheduled key rotation complete"),
                        Err(e) => tracing::error!(error = %e, "Scheduled key rotation failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("Key rotator stopping");
                        break;
                    }
                }
            }
        }
    }
}
