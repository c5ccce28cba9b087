//! In-memory session state and its transitions.
//!
//! `SessionManager` is the single owner of the process-wide `Session`.
//! Refresh is lazy: an expired access token is only exchanged when a caller
//! asks for fresh credentials, and concurrent callers share one in-flight
//! refresh instead of each spending the (single-use) refresh token.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::api::AuthApi;
use crate::models::CredentialPair;

use super::claims::{self, DecodeError, IdentityClaim};
use super::error::SessionError;
use super::store::TokenStore;

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Current authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Anonymous,
    Authenticated {
        identity: IdentityClaim,
        tokens: CredentialPair,
    },
    Refreshing {
        previous: CredentialPair,
    },
    /// A persisted session could not be renewed at startup.
    Invalid,
}

impl Session {
    pub fn identity(&self) -> Option<&IdentityClaim> {
        match self {
            Session::Authenticated { identity, .. } => Some(identity),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated { .. })
    }

    /// Short state name for logs and status lines.
    pub fn name(&self) -> &'static str {
        match self {
            Session::Anonymous => "anonymous",
            Session::Authenticated { .. } => "authenticated",
            Session::Refreshing { .. } => "refreshing",
            Session::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Clone)]
enum RefreshOutcome {
    Refreshed(CredentialPair),
    Failed,
    /// Logout or a new login happened while the refresh was in flight.
    Superseded,
}

type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct State {
    session: Session,
    /// Bumped on every transition that invalidates an in-flight refresh.
    generation: u64,
    pending: Option<PendingRefresh>,
}

struct Inner {
    state: Mutex<State>,
    store: Arc<dyn TokenStore>,
    api: Arc<dyn AuthApi>,
    clock: Arc<dyn Clock>,
}

impl Inner {
    // Transitions never panic while holding the lock, but recover anyway.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, tokens: &CredentialPair) {
        if let Err(e) = self.store.save(tokens) {
            warn!(error = %e, "Failed to save session");
        }
    }
}

/// Owner of the session. Clone is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create an anonymous session; call `restore` to pick up a stored pair.
    pub fn new(store: Arc<dyn TokenStore>, api: Arc<dyn AuthApi>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    session: Session::Anonymous,
                    generation: 0,
                    pending: None,
                }),
                store,
                api,
                clock,
            }),
        }
    }

    pub(crate) fn api(&self) -> &Arc<dyn AuthApi> {
        &self.inner.api
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Snapshot of the current state.
    pub fn session(&self) -> Session {
        self.inner.lock().session.clone()
    }

    pub fn current_identity(&self) -> Option<IdentityClaim> {
        self.inner.lock().session.identity().cloned()
    }

    /// Startup: adopt the stored pair, renewing it first if it has expired.
    pub async fn restore(&self) -> Session {
        let Some(tokens) = self.inner.store.load() else {
            debug!("No stored session");
            self.set_anonymous();
            return Session::Anonymous;
        };

        let identity = match claims::decode(&tokens.access_token) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Stored access token is unreadable, clearing");
                self.inner.store.clear();
                self.set_anonymous();
                return Session::Anonymous;
            }
        };

        if !identity.is_expired(self.now()) {
            info!(user = %identity.username, "Restored session");
            let mut state = self.inner.lock();
            state.generation += 1;
            state.pending = None;
            state.session = Session::Authenticated { identity, tokens };
            return state.session.clone();
        }

        debug!(user = %identity.username, "Stored access token expired, refreshing");
        let pending = {
            let mut state = self.inner.lock();
            self.begin_refresh(&mut state, tokens, Session::Invalid)
        };
        pending.await;
        self.session()
    }

    /// Fresh credentials for an outgoing request.
    ///
    /// Returns `Ok(None)` when nobody is logged in and `SessionExpired`
    /// when the access token expired and could not be renewed.
    pub async fn ensure_fresh(&self) -> Result<Option<CredentialPair>, SessionError> {
        let pending = {
            let mut state = self.inner.lock();
            let previous = match &state.session {
                Session::Anonymous | Session::Invalid => return Ok(None),
                Session::Authenticated { identity, tokens } => {
                    if !identity.is_expired(self.now()) {
                        return Ok(Some(tokens.clone()));
                    }
                    tokens.clone()
                }
                Session::Refreshing { previous } => previous.clone(),
            };
            if let Some(pending) = state.pending.clone() {
                debug!("Joining in-flight refresh");
                pending
            } else {
                debug!("Access token expired, refreshing");
                self.begin_refresh(&mut state, previous, Session::Anonymous)
            }
        };

        match pending.await {
            RefreshOutcome::Refreshed(tokens) => Ok(Some(tokens)),
            RefreshOutcome::Failed => Err(SessionError::expired()),
            RefreshOutcome::Superseded => Ok(self.fresh_tokens()),
        }
    }

    /// Adopt a pair returned by login/register.
    pub(crate) fn establish(&self, tokens: CredentialPair) -> Result<IdentityClaim, DecodeError> {
        let identity = claims::decode(&tokens.access_token)?;
        self.inner.persist(&tokens);

        let mut state = self.inner.lock();
        state.generation += 1;
        state.pending = None;
        state.session = Session::Authenticated {
            identity: identity.clone(),
            tokens,
        };
        info!(user = %identity.username, role = %identity.role, "Session established");
        Ok(identity)
    }

    /// Drop the session from any state and erase the stored pair.
    pub fn logout(&self) {
        self.inner.store.clear();
        let previous = self.set_anonymous();
        info!(from = previous.name(), "Logged out");
    }

    fn set_anonymous(&self) -> Session {
        let mut state = self.inner.lock();
        state.generation += 1;
        state.pending = None;
        std::mem::replace(&mut state.session, Session::Anonymous)
    }

    fn fresh_tokens(&self) -> Option<CredentialPair> {
        let state = self.inner.lock();
        match &state.session {
            Session::Authenticated { identity, tokens } if !identity.is_expired(self.now()) => {
                Some(tokens.clone())
            }
            _ => None,
        }
    }

    /// Enter `Refreshing` and register the shared refresh future.
    /// `on_failure` is the state a failed refresh settles into.
    fn begin_refresh(
        &self,
        state: &mut State,
        previous: CredentialPair,
        on_failure: Session,
    ) -> PendingRefresh {
        state.generation += 1;
        let generation = state.generation;
        state.session = Session::Refreshing {
            previous: previous.clone(),
        };

        // Weak so an abandoned refresh does not keep the manager alive.
        let inner = Arc::downgrade(&self.inner);
        let pending = run_refresh(inner, generation, previous, on_failure)
            .boxed()
            .shared();
        state.pending = Some(pending.clone());
        pending
    }
}

async fn run_refresh(
    inner: Weak<Inner>,
    generation: u64,
    previous: CredentialPair,
    on_failure: Session,
) -> RefreshOutcome {
    let Some(inner) = inner.upgrade() else {
        return RefreshOutcome::Superseded;
    };

    info!("Refreshing access token");
    let renewed = match inner.api.refresh(&previous.refresh_token).await {
        Ok(tokens) => match claims::decode(&tokens.access_token) {
            Ok(identity) => Some((identity, tokens)),
            Err(e) => {
                warn!(error = %e, "Refresh returned an unreadable access token");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "Token refresh failed");
            None
        }
    };

    let mut state = inner.lock();
    if state.generation != generation {
        debug!("Discarding refresh result for a superseded session");
        return RefreshOutcome::Superseded;
    }
    state.pending = None;

    match renewed {
        Some((identity, tokens)) => {
            inner.persist(&tokens);
            info!(user = %identity.username, "Access token refreshed");
            state.session = Session::Authenticated {
                identity,
                tokens: tokens.clone(),
            };
            RefreshOutcome::Refreshed(tokens)
        }
        None => {
            inner.store.clear();
            state.session = on_failure;
            RefreshOutcome::Failed
        }
    }
}
