//! Domain types shared by the stores, the connectors and the server.
//!
//! - [`Session`] / [`SessionKey`] - one interactive login and its code
//! - [`RemoteIdentity`] - what a connector says about the user
//! - [`User`] / [`PasswordInfo`] - local accounts
//! - [`ClientIdentity`] - a registered OAuth 2.0 client
//! - [`RefreshTokenRecord`] - the stored half of a refresh token

pub mod client;
pub mod identity;
pub mod refresh_token;
pub mod session;
pub mod user;

pub use client::{ClientIdentity, ClientSecret, GrantType};
pub use identity::RemoteIdentity;
pub use refresh_token::RefreshTokenRecord;
pub use session::{NewSession, Session, SessionKey, SessionState};
pub use user::{PasswordInfo, User};
