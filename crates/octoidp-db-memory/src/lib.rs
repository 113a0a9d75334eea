//! In-memory storage backend for OctoIDP.
//!
//! Implements every storage trait from `octoidp_auth::storage`:
//!
//! - [`MemorySessionStorage`] - sessions and session keys on `DashMap`, whose
//!   per-shard locks give the compare-and-swap and the single-winner key
//!   removal the session state machine relies on
//! - [`MemoryRefreshTokenStorage`] - refresh token records on papaya
//! - [`MemoryUserStorage`] - users, identity links and password hashes
//! - [`MemoryClientStorage`] - OAuth 2.0 client registrations
//!
//! Nothing survives a restart.
//!
//! # Example
//!
//! ```ignore
//! use octoidp_db_memory::create_stores;
//!
//! let stores = create_stores();
//! let registry = ClientRegistry::new(stores.clients.clone());
//! let server = AuthorizationServer::new(&config, keys, registry, connectors, stores.auth())?;
//! ```

mod clients;
mod refresh_tokens;
mod sessions;
mod users;

use std::sync::Arc;

use octoidp_auth::oauth::Stores;
use octoidp_auth::storage::{ClientStorage, PasswordStorage, UserStorage};

pub use clients::MemoryClientStorage;
pub use refresh_tokens::MemoryRefreshTokenStorage;
pub use sessions::MemorySessionStorage;
pub use users::MemoryUserStorage;

/// Every in-memory store, sharing one user map between the user and the
/// password traits.
#[derive(Clone)]
pub struct MemoryStores {
    pub sessions: Arc<MemorySessionStorage>,
    pub refresh_tokens: Arc<MemoryRefreshTokenStorage>,
    pub users: Arc<MemoryUserStorage>,
    pub clients: Arc<MemoryClientStorage>,
}

impl MemoryStores {
    /// The stores the authorization server needs.
    #[must_use]
    pub fn auth(&self) -> Stores {
        Stores {
            sessions: self.sessions.clone(),
            refresh_tokens: self.refresh_tokens.clone(),
            users: self.users.clone(),
        }
    }

    #[must_use]
    pub fn user_storage(&self) -> Arc<dyn UserStorage> {
        self.users.clone()
    }

    #[must_use]
    pub fn password_storage(&self) -> Arc<dyn PasswordStorage> {
        self.users.clone()
    }

    #[must_use]
    pub fn client_storage(&self) -> Arc<dyn ClientStorage> {
        self.clients.clone()
    }
}

/// Creates an empty set of in-memory stores.
#[must_use]
pub fn create_stores() -> MemoryStores {
    MemoryStores {
        sessions: Arc::new(MemorySessionStorage::new()),
        refresh_tokens: Arc::new(MemoryRefreshTokenStorage::new()),
        users: Arc::new(MemoryUserStorage::new()),
        clients: Arc::new(MemoryClientStorage::new()),
    }
}
