//! # octoidp-auth
//!
//! Core of the OctoIDP OpenID Connect identity provider.
//!
//! This crate provides:
//! - Signing key management with rotation and a grace window
//! - The login session state machine and single-use authorization codes
//! - Encrypted, revocable refresh tokens
//! - Upstream connectors (local passwords, LDAP, remote OIDC)
//! - The client registry with trusted-peer audiences
//! - The authorization/token server and its Axum handlers
//!
//! ## Modules
//!
//! - [`config`] - Identity provider configuration
//! - [`keys`] - Signing keys, JWK set and rotation
//! - [`session`] - Login sessions and session keys
//! - [`refresh`] - Refresh token store
//! - [`connector`] - Upstream identity connectors
//! - [`client`] - Client registry
//! - [`token`] - ID token claims and minting
//! - [`oauth`] - The authorization server
//! - [`storage`] - Storage traits
//! - [`http`] - Axum HTTP handlers

pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod http;
pub mod keys;
pub mod oauth;
pub mod password;
pub mod refresh;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;

pub use config::IdpConfig;
pub use error::{AuthError, AuthResult, ErrorCategory};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use octoidp_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::{ClientCredentials, ClientRegistry};
    pub use crate::config::IdpConfig;
    pub use crate::connector::{
        Connector, ConnectorConfig, ConnectorError, ConnectorKind, ConnectorRegistry, Credentials,
    };
    pub use crate::error::{AuthError, AuthResult, ErrorCategory};
    pub use crate::http::{IdpState, router};
    pub use crate::keys::{KeyManager, KeyRotator, SigningAlgorithm, SigningKeyPair};
    pub use crate::oauth::{AuthorizationServer, Stores};
    pub use crate::refresh::RefreshTokenManager;
    pub use crate::session::SessionManager;
    pub use crate::storage::{
        ClientStorage, PasswordStorage, RefreshTokenStorage, SessionStorage, UserStorage,
    };
    pub use crate::types::{ClientIdentity, ClientSecret, RemoteIdentity, User};
}
