//! AES-256-GCM sealing with an ordered list of secrets.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;

use crate::error::{AuthError, AuthResult};

/// Nonce size for AES-256-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Secrets ordered newest first.
///
/// [`seal`](Self::seal) always uses the newest secret. [`open`](Self::open)
/// tries each secret in order and reports only success or failure, so a
/// wrong secret and a tampered ciphertext look the same to the caller.
#[derive(Clone)]
pub struct SecretRing {
    ciphers: Vec<Aes256Gcm>,
}

impl SecretRing {
    /// Builds a ring from 256-bit secrets, newest first.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `secrets` is empty.
    pub fn new(secrets: &[[u8; 32]]) -> AuthResult<Self> {
        if secrets.is_empty() {
            return Err(AuthError::configuration(
                "at least one refresh token secret is required",
            ));
        }

        let ciphers = secrets
            .iter()
            .map(|secret| {
                Aes256Gcm::new_from_slice(secret)
                    .map_err(|e| AuthError::configuration(format!("invalid secret: {e}")))
            })
            .collect::<AuthResult<Vec<_>>>()?;
        Ok(Self { ciphers })
    }

    /// Encrypts `plaintext` under the newest secret.
    ///
    /// # Errors
    ///
    /// Returns an internal error if encryption fails.
    pub fn seal(&self, plaintext: &[u8]) -> AuthResult<Vec<u8>> {
        let cipher = self
            .ciphers
            .first()
            .ok_or_else(|| AuthError::internal("secret ring is empty"))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| AuthError::internal(format!("refresh token encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypts `nonce || ciphertext` with the first secret that
    /// authenticates it.
    #[must_use]
    pub fn open(&self, sealed: &[u8]) -> Option<Vec<u8>> {
        if sealed.len() <= NONCE_SIZE {
            return None;
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce);

        self.ciphers
            .iter()
            .find_map(|cipher| cipher.decrypt(nonce, ciphertext).ok())
    }
}

impl std::fmt::Debug for SecretRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRing")
            .field("secrets", &self.ciphers.len())
            .finish()
    }
}
