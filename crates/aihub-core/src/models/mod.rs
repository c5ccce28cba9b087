//! Data models shared between the session core and its callers.
//!
//! This module contains:
//!
//! - `CredentialPair`: the access/refresh token pair issued by the backend
//! - `AuthGrant`, `UserProfile`: login/register response bodies
//! - `PasswordStrength`: result of the password policy check

pub mod account;
pub mod auth;

pub use account::PasswordStrength;
pub use auth::{AuthGrant, CredentialPair, UserProfile};
