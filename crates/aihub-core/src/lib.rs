//! aihub core - session and token lifecycle for the aihub front end.
//!
//! The chat, image, speech, and translation panels share one logged-in
//! session. This crate owns it: it restores the stored token pair at
//! startup, derives the user's identity from the access token, renews
//! expired tokens on demand, and attaches credentials to outgoing requests.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{AccountClient, ApiClient, ApiError, AuthApi};
pub use auth::{CredentialProvider, IdentityClaim, Session, SessionError, TokenStore};
pub use config::{Config, TokenStoreKind};
pub use models::{CredentialPair, PasswordStrength};
