//! ID token claims and minting.
//!
//! The server issues no separate access token: the signed ID token is
//! returned as both `id_token` and `access_token`.

mod claims;
mod issuer;

pub use claims::{Audience, IdTokenClaims};
pub use issuer::{IdTokenIssuer, TokenSubject};
