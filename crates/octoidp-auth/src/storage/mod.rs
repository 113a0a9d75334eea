//! Storage traits for identity provider state.
//!
//! This module defines storage interfaces for:
//!
//! - Login sessions and their one-time keys
//! - Refresh token records
//! - OAuth client registrations
//! - Local users and their password hashes
//!
//! # Implementations
//!
//! Storage implementations are provided in separate crates:
//!
//! - `octoidp-db-memory` - lock-free in-memory backend

pub mod client;
pub mod refresh_token;
pub mod session;
pub mod user;

pub use client::ClientStorage;
pub use refresh_token::RefreshTokenStorage;
pub use session::SessionStorage;
pub use user::{PasswordStorage, UserStorage};
