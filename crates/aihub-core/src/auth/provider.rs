//! Facade handed to feature panels.
//!
//! Panels never see tokens directly: they read the current identity and
//! send protected requests through `authorized_fetch`, which is the only
//! place a bearer header is ever built.

use std::sync::Arc;

use reqwest::header::{self, HeaderValue};
use tracing::{debug, warn};

use crate::api::{ApiError, AuthApi};
use crate::models::{AuthGrant, CredentialPair};

use super::claims::IdentityClaim;
use super::error::SessionError;
use super::session::{Clock, Session, SessionManager, SystemClock};
use super::store::TokenStore;

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";

#[derive(Clone)]
pub struct CredentialProvider {
    session: SessionManager,
}

impl CredentialProvider {
    pub fn new(store: Arc<dyn TokenStore>, api: Arc<dyn AuthApi>) -> Self {
        Self::with_clock(store, api, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn TokenStore>,
        api: Arc<dyn AuthApi>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session: SessionManager::new(store, api, clock),
        }
    }

    /// Build a provider and restore any stored session.
    pub async fn start(store: Arc<dyn TokenStore>, api: Arc<dyn AuthApi>) -> Self {
        let provider = Self::new(store, api);
        let session = provider.session.restore().await;
        debug!(state = session.name(), "Session restored at startup");
        provider
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session
    }

    pub fn api(&self) -> &Arc<dyn AuthApi> {
        self.session.api()
    }

    pub fn session(&self) -> Session {
        self.session.session()
    }

    /// Identity of the logged-in user; `None` unless authenticated.
    pub fn current_identity(&self) -> Option<IdentityClaim> {
        self.session.current_identity()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<IdentityClaim, SessionError> {
        let result = self.session.api().login(email, password).await;
        self.adopt(result, LOGIN_FAILED)
    }

    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<IdentityClaim, SessionError> {
        if username.trim().is_empty() {
            return Err(SessionError::Validation("Username is required".to_string()));
        }
        let result = self.session.api().register(email, username, password).await;
        self.adopt(result, REGISTRATION_FAILED)
    }

    fn adopt(
        &self,
        result: Result<AuthGrant, ApiError>,
        fallback: &str,
    ) -> Result<IdentityClaim, SessionError> {
        let grant = match result {
            Ok(grant) => grant,
            Err(ApiError::NetworkError(e)) => return Err(ApiError::NetworkError(e).into()),
            Err(e) => {
                warn!(error = %e, "{}", fallback);
                return Err(SessionError::Auth(e.user_message(fallback)));
            }
        };

        let identity = self.session.establish(grant.tokens)?;
        if identity.subject_id != grant.user.user_id {
            warn!(
                token_subject = %identity.subject_id,
                user_id = %grant.user.user_id,
                "User record does not match token subject"
            );
        }
        Ok(identity)
    }

    /// Forget the session. Never fails and is safe to call repeatedly.
    pub fn logout(&self) {
        self.session.logout();
    }

    /// Fresh credentials, refreshing first if the access token expired.
    pub async fn ensure_fresh(&self) -> Result<Option<CredentialPair>, SessionError> {
        self.session.ensure_fresh().await
    }

    /// Send `request` with the current bearer token attached.
    ///
    /// Anonymous sessions send the request unchanged. When the token
    /// expired and cannot be renewed, the request is sent without
    /// credentials and `SessionExpired` carries its response. Nothing is
    /// retried.
    pub async fn authorized_fetch(
        &self,
        mut request: reqwest::Request,
    ) -> Result<reqwest::Response, SessionError> {
        // Only this function decides what credentials go out.
        request.headers_mut().remove(header::AUTHORIZATION);

        match self.session.ensure_fresh().await {
            Ok(Some(tokens)) => {
                let value = HeaderValue::from_str(&format!("Bearer {}", tokens.access_token))
                    .map_err(|e| {
                        ApiError::InvalidResponse(format!("Access token is not a valid header: {}", e))
                    })?;
                request.headers_mut().insert(header::AUTHORIZATION, value);
                Ok(self.session.api().execute(request).await?)
            }
            Ok(None) => Ok(self.session.api().execute(request).await?),
            Err(SessionError::SessionExpired { .. }) => {
                debug!(url = %request.url(), "Session expired, sending without credentials");
                let response = match self.session.api().execute(request).await {
                    Ok(response) => Some(Box::new(response)),
                    Err(e) => {
                        warn!(error = %e, "Unauthenticated fallback request failed");
                        None
                    }
                };
                Err(SessionError::SessionExpired { response })
            }
            Err(e) => Err(e),
        }
    }
}
