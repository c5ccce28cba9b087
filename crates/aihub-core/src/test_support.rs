//! Scripted backend, settable clock, and token builder shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use reqwest::{header, Url};
use serde_json::json;

use crate::api::{ApiError, AuthApi};
use crate::auth::Clock;
use crate::models::{AuthGrant, CredentialPair, UserProfile};

/// Fixed "now" used by most tests (2023-11-14T22:13:20Z).
pub(crate) const T0: i64 = 1_700_000_000;

const BASE_URL: &str = "http://backend.test/api/";

/// Build an unsigned three-segment token for `subject` expiring at `exp`.
pub(crate) fn make_token(subject: &str, exp: i64) -> String {
    let header = json!({ "alg": "HS256", "typ": "JWT" });
    let payload = json!({
        "userId": subject,
        "email": format!("{}@example.com", subject),
        "username": format!("user-{}", subject),
        "role": "user",
        "iat": exp - 900,
        "exp": exp,
    });
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

/// Pair whose access token expires at `exp`.
pub(crate) fn make_pair(subject: &str, exp: i64, refresh: &str) -> CredentialPair {
    CredentialPair::new(make_token(subject, exp), refresh).unwrap()
}

pub(crate) fn make_grant(subject: &str, exp: i64, refresh: &str) -> AuthGrant {
    AuthGrant {
        tokens: make_pair(subject, exp, refresh),
        user: UserProfile {
            user_id: subject.to_string(),
            email: format!("{}@example.com", subject),
            username: format!("user-{}", subject),
            role: "user".to_string(),
        },
    }
}

pub(crate) struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub(crate) fn at(ts: i64) -> Self {
        Self(Mutex::new(DateTime::from_timestamp(ts, 0).unwrap()))
    }

    pub(crate) fn advance(&self, secs: i64) {
        let mut now = self.0.lock().unwrap();
        *now += Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Canned reply: a value, or a status code with a raw body.
pub(crate) type Scripted<T> = Result<T, (u16, String)>;

/// What `execute` saw on the wire.
#[derive(Debug, Clone)]
pub(crate) struct SentRequest {
    pub url: String,
    pub authorization: Option<String>,
    pub body: Option<serde_json::Value>,
}

pub(crate) struct MockApi {
    pub login_reply: Mutex<Scripted<AuthGrant>>,
    pub register_reply: Mutex<Scripted<AuthGrant>>,
    pub refresh_reply: Mutex<Scripted<CredentialPair>>,
    pub fetch_replies: Mutex<VecDeque<(u16, String)>>,
    pub login_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub refresh_tokens_seen: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<SentRequest>>,
    /// Scheduler yields inside `refresh` so concurrent callers can pile up.
    pub refresh_yields: usize,
}

fn unscripted<T>() -> Scripted<T> {
    Err((500, r#"{"message":"not scripted"}"#.to_string()))
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            login_reply: Mutex::new(unscripted()),
            register_reply: Mutex::new(unscripted()),
            refresh_reply: Mutex::new(unscripted()),
            fetch_replies: Mutex::new(VecDeque::new()),
            login_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            refresh_tokens_seen: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            refresh_yields: 3,
        }
    }
}

impl MockApi {
    pub(crate) fn set_login(&self, reply: Scripted<AuthGrant>) {
        *self.login_reply.lock().unwrap() = reply;
    }

    pub(crate) fn set_register(&self, reply: Scripted<AuthGrant>) {
        *self.register_reply.lock().unwrap() = reply;
    }

    pub(crate) fn set_refresh(&self, reply: Scripted<CredentialPair>) {
        *self.refresh_reply.lock().unwrap() = reply;
    }

    pub(crate) fn push_fetch(&self, status: u16, body: &str) {
        self.fetch_replies
            .lock()
            .unwrap()
            .push_back((status, body.to_string()));
    }

    pub(crate) fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().unwrap().clone()
    }

    fn reply<T: Clone>(slot: &Mutex<Scripted<T>>) -> Result<T, ApiError> {
        match &*slot.lock().unwrap() {
            Ok(value) => Ok(value.clone()),
            Err((status, body)) => Err(ApiError::from_status(
                reqwest::StatusCode::from_u16(*status).unwrap(),
                body,
            )),
        }
    }
}

#[async_trait]
impl AuthApi for MockApi {
    async fn login(&self, _email: &str, _password: &str) -> Result<AuthGrant, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        Self::reply(&self.login_reply)
    }

    async fn register(
        &self,
        _email: &str,
        _username: &str,
        _password: &str,
    ) -> Result<AuthGrant, ApiError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        Self::reply(&self.register_reply)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_tokens_seen
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        for _ in 0..self.refresh_yields {
            tokio::task::yield_now().await;
        }
        Self::reply(&self.refresh_reply)
    }

    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, ApiError> {
        let authorization = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = request
            .body()
            .and_then(|b| b.as_bytes())
            .and_then(|b| serde_json::from_slice(b).ok());
        self.sent.lock().unwrap().push(SentRequest {
            url: request.url().to_string(),
            authorization,
            body,
        });

        let (status, body) = self
            .fetch_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((200, "{}".to_string()));
        let response = http::Response::builder().status(status).body(body).unwrap();
        Ok(reqwest::Response::from(response))
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(Url::parse(BASE_URL)
            .unwrap()
            .join(path.trim_start_matches('/'))
            .unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_calls_fail_for_every_endpoint() {
        let api = MockApi::default();
        let not_scripted = |e: ApiError| e.to_string() == "not scripted";

        assert!(not_scripted(api.login("a@b.com", "pw").await.unwrap_err()));
        assert!(not_scripted(api.register("a@b.com", "a", "pw").await.unwrap_err()));
        assert!(not_scripted(api.refresh("r1").await.unwrap_err()));
        assert_eq!(api.refresh_count(), 1);
    }
}
