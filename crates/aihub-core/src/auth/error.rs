use thiserror::Error;

use crate::api::ApiError;

use super::claims::DecodeError;

/// Errors surfaced to panels by the credential provider.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Backend rejected the credentials; the message is for inline display.
    #[error("{0}")]
    Auth(String),

    /// Client-side precondition failed before any network call.
    #[error("{0}")]
    Validation(String),

    /// Refresh was exhausted; the caller must prompt for re-authentication.
    /// Carries the response of the request sent without credentials, if any.
    #[error("Session expired - please log in again")]
    SessionExpired {
        response: Option<Box<reqwest::Response>>,
    },

    /// The backend issued a token this client cannot read.
    #[error(transparent)]
    MalformedToken(#[from] DecodeError),

    /// Transport failure (connection refused, timeout, unreadable body).
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SessionError {
    pub(crate) fn expired() -> Self {
        SessionError::SessionExpired { response: None }
    }

    /// True when the caller should send the user back to the login view.
    pub fn requires_login(&self) -> bool {
        matches!(self, SessionError::SessionExpired { .. })
    }
}
