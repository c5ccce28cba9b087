//! HTTP client for the aihub auth backend.
//!
//! `AuthApi` is the seam between the session core and the network: the
//! session manager only ever talks to the backend through it, so tests can
//! substitute a scripted implementation.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::debug;

use crate::models::auth::RefreshGrant;
use crate::models::{AuthGrant, CredentialPair};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default backend base URL (local development server)
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api/";

/// Backend calls the session core depends on.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange email/password for a token pair and user record.
    async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, ApiError>;

    /// Create an account; same response shape as `login`.
    async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthGrant, ApiError>;

    /// Exchange a refresh token for a new pair.
    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, ApiError>;

    /// Send an arbitrary prepared request as-is.
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, ApiError>;

    /// Resolve a path relative to the backend base URL.
    fn endpoint(&self, path: &str) -> Result<Url, ApiError>;
}

/// API client for the aihub backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a client for the given base URL.
    ///
    /// No request timeout is set: a call ends when the caller drops it.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: Self::parse_base_url(base_url)?,
        })
    }

    /// Base URLs must end in `/` so relative joins keep the path prefix.
    fn parse_base_url(base_url: &str) -> Result<Url, ApiError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        Url::parse(&normalized)
            .map_err(|e| ApiError::InvalidResponse(format!("Invalid base URL {}: {}", base_url, e)))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Underlying HTTP client, for building requests passed to `execute`.
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        debug!(url = %url, "POST");
        let response = self.client.post(url).json(body).send().await?;
        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, ApiError> {
        self.post_json(
            "auth/login",
            &json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthGrant, ApiError> {
        self.post_json(
            "auth/register",
            &json!({ "email": email, "username": username, "password": password }),
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, ApiError> {
        let grant: RefreshGrant = self
            .post_json("auth/refresh", &json!({ "refreshToken": refresh_token }))
            .await?;
        Ok(grant.tokens)
    }

    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, ApiError> {
        debug!(method = %request.method(), url = %request.url(), "Sending request");
        Ok(self.client.execute(request).await?)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidResponse(format!("Invalid endpoint {}: {}", path, e)))
    }
}
