//! Authentication module for managing the user session and its tokens.
//!
//! This module provides:
//! - `claims`: identity decoded from an access token's payload
//! - `TokenStore`: single-slot persistence of the credential pair
//! - `SessionManager`: session state machine with coalesced refresh
//! - `CredentialProvider`: the facade panels use for identity and requests
//!
//! Refresh is on demand only; there is no background timer.

pub mod claims;
pub mod error;
pub mod provider;
pub mod session;
pub mod store;

pub use claims::{decode, DecodeError, IdentityClaim};
pub use error::SessionError;
pub use provider::CredentialProvider;
pub use session::{Clock, Session, SessionManager, SystemClock};
pub use store::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore};
