//! Client registry.
//!
//! Wraps [`ClientStorage`](crate::storage::ClientStorage) with the checks
//! the endpoints need: secret authentication, redirect URI matching and the
//! trusted-peer edge list used for cross-client audiences.

mod peers;
mod registry;

pub use peers::TrustedPeers;
pub use registry::{ClientCredentials, ClientRegistry};
