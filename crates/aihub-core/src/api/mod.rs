//! REST client module for the aihub backend.
//!
//! This module provides the `ApiClient` for the auth endpoints
//! (login, register, refresh) and the `AccountClient` for account
//! management calls that ride on the session's bearer token.

pub mod account;
pub mod client;
pub mod error;

pub use account::AccountClient;
pub use client::{ApiClient, AuthApi, DEFAULT_BASE_URL};
pub use error::ApiError;
