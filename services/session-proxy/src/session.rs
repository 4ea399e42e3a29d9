//! Session status and login navigation for the sidecar
//!
//! The sidecar has no UI to redirect, so "navigate to login" means: flip the
//! reported status to `login_required` and tell the operator where to log in.
//! A new pair installed through the admin API flips it back to `active`. All
//! session events reach the status through one ordered navigation task.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use session_auth::{BoxFuture, CredentialStore, TokenKey};
use session_pipeline::Navigator;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    LoginRequired,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: SessionState,
    /// Unix seconds of the last successful refresh, if any.
    pub last_refreshed_at: Option<u64>,
    pub refreshes: u64,
    pub expirations: u64,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    last_refreshed_at: Option<u64>,
    refreshes: u64,
    expirations: u64,
}

/// Operator-visible session status, shared by the admin API and navigator.
#[derive(Debug)]
pub struct SessionStatus {
    inner: RwLock<Inner>,
}

impl SessionStatus {
    pub fn new(state: SessionState) -> Self {
        Self {
            inner: RwLock::new(Inner {
                state,
                last_refreshed_at: None,
                refreshes: 0,
                expirations: 0,
            }),
        }
    }

    /// Initial status from whatever the store holds at startup.
    pub async fn from_store(store: &dyn CredentialStore) -> Self {
        let state = match store.get(TokenKey::Access).await {
            Some(token) if !token.expose_str().is_empty() => SessionState::Active,
            _ => SessionState::LoginRequired,
        };
        Self::new(state)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        StatusSnapshot {
            state: inner.state,
            last_refreshed_at: inner.last_refreshed_at,
            refreshes: inner.refreshes,
            expirations: inner.expirations,
        }
    }

    pub fn state(&self) -> SessionState {
        self.snapshot().state
    }

    pub fn mark_active(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .state = SessionState::Active;
    }

    pub fn mark_refreshed(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.state = SessionState::Active;
        inner.refreshes += 1;
        inner.last_refreshed_at = Some(unix_now());
    }

    pub fn mark_login_required(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .state = SessionState::LoginRequired;
    }

    fn mark_expired(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.state = SessionState::LoginRequired;
        inner.expirations += 1;
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `Navigator` that keeps `SessionStatus` in step with session events and
/// points the operator at login on expiry.
pub struct LoginNavigator {
    status: Arc<SessionStatus>,
    login_url: String,
}

impl LoginNavigator {
    pub fn new(status: Arc<SessionStatus>, login_url: impl Into<String>) -> Self {
        Self {
            status,
            login_url: login_url.into(),
        }
    }
}

impl Navigator for LoginNavigator {
    fn navigate_to_login(&self) -> BoxFuture<'_, session_pipeline::Result<()>> {
        Box::pin(async move {
            self.status.mark_expired();
            warn!(login_url = %self.login_url, "session expired, login required");
            Ok(())
        })
    }

    fn session_refreshed(&self) -> BoxFuture<'_, session_pipeline::Result<()>> {
        Box::pin(async move {
            self.status.mark_refreshed();
            info!("session refreshed");
            Ok(())
        })
    }
}
