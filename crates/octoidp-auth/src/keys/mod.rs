//! Signing keys.
//!
//! - [`SigningKeyPair`] - one asymmetric key able to sign and verify JWTs
//! - [`KeyManager`] - the active signer plus verify-only predecessors
//! - [`KeyRotator`] - replaces the active key on a schedule

mod manager;
mod pair;
mod rotation;

pub use manager::KeyManager;
pub use pair::{Jwk, Jwks, KeyError, SigningAlgorithm, SigningKeyPair};
pub use rotation::KeyRotator;
