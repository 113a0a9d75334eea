//! Login session state machine.
//!
//! [`SessionManager`] owns the TTLs and the transition rules; the
//! [`SessionStorage`](crate::storage::SessionStorage) behind it only has to
//! provide a compare-and-swap update and an atomic key removal.

mod manager;

pub use manager::SessionManager;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

/// Generates a 256-bit random identifier, base64url without padding.
#[must_use]
pub fn random_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Shortens an identifier for log fields.
#[must_use]
pub(crate) fn log_prefix(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
