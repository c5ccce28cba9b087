//! Credential and account types exchanged with the auth backend.
//!
//! Field names follow the backend's camelCase wire format so the persisted
//! record is exactly what the backend issued.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Access/refresh token pair.
///
/// Both tokens are always present: deserializing a record with a missing
/// or empty token fails, so a partial pair can never be loaded or saved.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawCredentialPair")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    /// Build a pair, rejecting empty tokens.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Option<Self> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();
        if access_token.is_empty() || refresh_token.is_empty() {
            return None;
        }
        Some(Self {
            access_token,
            refresh_token,
        })
    }
}

// Tokens are bearer credentials; keep them out of logs and panic messages.
impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCredentialPair {
    access_token: String,
    refresh_token: String,
}

impl TryFrom<RawCredentialPair> for CredentialPair {
    type Error = &'static str;

    fn try_from(raw: RawCredentialPair) -> Result<Self, Self::Error> {
        CredentialPair::new(raw.access_token, raw.refresh_token)
            .ok_or("accessToken and refreshToken must both be non-empty")
    }
}

/// User record returned alongside tokens on login/register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    pub email: String,
    pub username: String,
    pub role: String,
}

/// Successful login/register response body.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthGrant {
    pub tokens: CredentialPair,
    pub user: UserProfile,
}

/// Successful refresh response body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RefreshGrant {
    pub tokens: CredentialPair,
}

/// Accept user ids issued either as JSON strings or integers.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
        Uint(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Int(n) => n.to_string(),
        Id::Uint(n) => n.to_string(),
    })
}
