//! Account management calls (password change, deletion, policy check).
//!
//! These go through `CredentialProvider::authorized_fetch` like every other
//! protected request, so they pick up refresh and expiry handling for free.

use reqwest::{Method, Request, Response};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::info;

use crate::auth::{CredentialProvider, SessionError};
use crate::models::PasswordStrength;

use super::ApiError;

const CHANGE_PASSWORD_FAILED: &str = "Failed to change password";
const DELETE_ACCOUNT_FAILED: &str = "Failed to delete account";
const VALIDATE_PASSWORD_FAILED: &str = "Failed to validate password";

pub struct AccountClient {
    provider: CredentialProvider,
}

impl AccountClient {
    pub fn new(provider: CredentialProvider) -> Self {
        Self { provider }
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), SessionError> {
        if new_password != confirm_password {
            return Err(SessionError::Validation(
                "New passwords do not match".to_string(),
            ));
        }
        let body = json!({
            "currentPassword": current_password,
            "newPassword": new_password,
            "confirmPassword": confirm_password,
        });
        let response = self.post("auth/change-password", &body).await?;
        Self::check(response, CHANGE_PASSWORD_FAILED).await?;
        info!("Password changed");
        Ok(())
    }

    /// Delete the account and, on success, end the session.
    pub async fn delete_account(&self, password: &str) -> Result<(), SessionError> {
        let response = self
            .post("auth/delete-account", &json!({ "password": password }))
            .await?;
        Self::check(response, DELETE_ACCOUNT_FAILED).await?;
        info!("Account deleted");
        self.provider.logout();
        Ok(())
    }

    /// Ask the backend whether `password` meets its policy.
    pub async fn validate_password(&self, password: &str) -> Result<PasswordStrength, SessionError> {
        let response = self
            .post("auth/validate-password", &json!({ "password": password }))
            .await?;
        Self::parse(response, VALIDATE_PASSWORD_FAILED).await
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Response, SessionError> {
        let url = self.provider.api().endpoint(path)?;
        let mut request = Request::new(Method::POST, url);
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))?;
        request.headers_mut().insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        *request.body_mut() = Some(bytes.into());
        self.provider.authorized_fetch(request).await
    }

    /// Map non-2xx to `Auth` with the backend message, or `fallback`.
    async fn check(response: Response, fallback: &str) -> Result<Response, SessionError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(SessionError::Auth(
            ApiError::from_status(status, &body).user_message(fallback),
        ))
    }

    async fn parse<T: DeserializeOwned>(response: Response, fallback: &str) -> Result<T, SessionError> {
        let response = Self::check(response, fallback).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", fallback, e)).into())
    }
}
