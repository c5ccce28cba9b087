//! Identity claims carried in an access token's payload segment.
//!
//! Tokens are treated as opaque bearer credentials: only the payload is
//! decoded and the signature is never checked here. Trust is the issuing
//! backend's job.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::auth::string_or_number;

/// Number of dot-separated segments in a signed token.
const TOKEN_SEGMENTS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed token: expected 3 segments, found {0}")]
    SegmentCount(usize),

    #[error("Malformed token: payload is not valid base64url")]
    Base64,

    #[error("Malformed token: payload is not a valid claim set: {0}")]
    Claims(String),

    #[error("Malformed token: expiry {0} is out of range")]
    Expiry(i64),
}

/// Identity derived from an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct IdentityClaim {
    pub subject_id: String,
    pub email: String,
    pub username: String,
    pub role: String,
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub issued_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub expires_at: DateTime<Utc>,
}

impl IdentityClaim {
    /// True once `now` has reached the token's expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Seconds left before expiry (0 when already expired), for display.
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(rename = "userId", alias = "sub", deserialize_with = "string_or_number")]
    subject_id: String,
    email: String,
    username: String,
    role: String,
    #[serde(default)]
    iat: Option<i64>,
    exp: i64,
}

/// Decode the identity claims of an access token.
pub fn decode(access_token: &str) -> Result<IdentityClaim, DecodeError> {
    let segments: Vec<&str> = access_token.split('.').collect();
    if segments.len() != TOKEN_SEGMENTS {
        return Err(DecodeError::SegmentCount(segments.len()));
    }

    let raw = decode_segment(segments[1])?;
    let payload: Payload =
        serde_json::from_slice(&raw).map_err(|e| DecodeError::Claims(e.to_string()))?;

    let expires_at =
        DateTime::from_timestamp(payload.exp, 0).ok_or(DecodeError::Expiry(payload.exp))?;
    let issued_at = payload.iat.and_then(|iat| DateTime::from_timestamp(iat, 0));

    Ok(IdentityClaim {
        subject_id: payload.subject_id,
        email: payload.email,
        username: payload.username,
        role: payload.role,
        issued_at,
        expires_at,
    })
}

/// Tokens are normally unpadded, but some issuers keep the `=` padding.
fn decode_segment(segment: &str) -> Result<Vec<u8>, DecodeError> {
    if segment.ends_with('=') {
        URL_SAFE.decode(segment)
    } else {
        URL_SAFE_NO_PAD.decode(segment)
    }
    .map_err(|_| DecodeError::Base64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::make_token;
    use chrono::Duration;

    fn payload_token(payload: &str) -> String {
        format!("e30.{}.sig", URL_SAFE_NO_PAD.encode(payload))
    }

    #[test]
    fn test_decode_valid_token() {
        let token = make_token("u-1", 1_700_000_000);
        let claim = decode(&token).unwrap();
        assert_eq!(claim.subject_id, "u-1");
        assert_eq!(claim.email, "u-1@example.com");
        assert_eq!(claim.username, "user-u-1");
        assert_eq!(claim.role, "user");
        assert_eq!(claim.expires_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_expiry_matches_payload_exactly() {
        for exp in [0_i64, 1, 1_699_999_999, 1_700_000_000, 4_102_444_800] {
            let claim = decode(&make_token("x", exp)).unwrap();
            assert_eq!(claim.expires_at.timestamp(), exp);
        }
    }

    #[test]
    fn test_wrong_segment_count() {
        assert_eq!(decode(""), Err(DecodeError::SegmentCount(1)));
        assert_eq!(decode("abc"), Err(DecodeError::SegmentCount(1)));
        assert_eq!(decode("abc.def"), Err(DecodeError::SegmentCount(2)));
        assert_eq!(decode("a.b.c.d"), Err(DecodeError::SegmentCount(4)));
    }

    #[test]
    fn test_bad_payload() {
        assert_eq!(decode("h.!!!.s"), Err(DecodeError::Base64));
        assert!(matches!(
            decode(&payload_token("not json")),
            Err(DecodeError::Claims(_))
        ));
        // Missing role
        let token = payload_token(r#"{"userId":"1","email":"e","username":"u","exp":10}"#);
        assert!(matches!(decode(&token), Err(DecodeError::Claims(_))));
    }

    #[test]
    fn test_sub_alias_and_numeric_id() {
        let token =
            payload_token(r#"{"sub":7,"email":"e","username":"u","role":"admin","exp":10,"iat":5}"#);
        let claim = decode(&token).unwrap();
        assert_eq!(claim.subject_id, "7");
        assert_eq!(claim.role, "admin");
        assert_eq!(claim.issued_at.map(|t| t.timestamp()), Some(5));
    }

    #[test]
    fn test_padded_payload() {
        let json = r#"{"userId":"1","email":"e","username":"u","role":"r","exp":10}"#;
        let token = format!("h.{}.s", URL_SAFE.encode(json));
        assert_eq!(decode(&token).unwrap().expires_at.timestamp(), 10);
    }

    #[test]
    fn test_is_expired() {
        let claim = decode(&make_token("x", 1_000)).unwrap();
        let exp = claim.expires_at;
        assert!(!claim.is_expired(exp - Duration::seconds(1)));
        assert!(claim.is_expired(exp));
        assert!(claim.is_expired(exp + Duration::seconds(1)));
        assert_eq!(claim.seconds_until_expiry(exp - Duration::seconds(30)), 30);
        assert_eq!(claim.seconds_until_expiry(exp + Duration::seconds(30)), 0);
    }
}
