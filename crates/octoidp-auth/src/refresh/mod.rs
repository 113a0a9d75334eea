//! Refresh tokens.
//!
//! A refresh token travels as `<id>/<payload>`, where `id` is the storage
//! handle and `payload` is base64url (no padding) of `nonce || ciphertext`
//! under AES-256-GCM. The plaintext names the user and the client the token
//! is bound to.

mod cipher;
mod manager;

pub use cipher::SecretRing;
pub use manager::RefreshTokenManager;

/// Separates the token ID from the payload. Not part of the base64url
/// alphabet.
pub const DELIMITER: char = '/';
