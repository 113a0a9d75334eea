//! OAuth 2.0 / OpenID Connect authorization server.
//!
//! - [`authorize`] - Authorization endpoint request and redirects
//! - [`token`] - Token and revocation endpoint types
//! - [`scope`] - Supported scopes
//! - [`server`] - The [`AuthorizationServer`] driving the flow
//!
//! # Example
//!
//! ```ignore
//! use octoidp_auth::oauth::{AuthorizationServer, Stores};
//!
//! let server = AuthorizationServer::new(&config, keys, clients, connectors, stores)?;
//! let login_url = server.authorize(request).await?;
//! // ... connector login, then:
//! let response = server.token(&credentials, token_request).await?;
//! ```

pub mod authorize;
pub mod scope;
pub mod server;
pub mod token;

pub use authorize::{AuthorizationFailure, AuthorizationRequest};
pub use server::{AuthorizationServer, Stores};
pub use token::{RevocationRequest, TokenError, TokenRequest, TokenResponse};
