//! Session expiry and login navigation
//!
//! When a refresh fails the session is over: both tokens are cleared and a
//! `SessionEvent::Expired` is broadcast. Whatever owns the user-facing login
//! flow subscribes and reacts; the pipeline never waits on it. Every failure
//! in this module is logged and dropped so it cannot mask the 401 that
//! triggered it.

use std::sync::Arc;

use session_auth::{BoxFuture, CredentialStore, TokenKey};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::error::Result;

const EVENT_CAPACITY: usize = 16;

/// One-way notifications about the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The token pair was rotated.
    Refreshed,
    /// Refresh failed and the credentials were cleared. Login required.
    Expired,
}

/// Broadcast channel for `SessionEvent`s.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Fire-and-forget. Having no subscribers is not an error.
    pub fn emit(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            debug!(?event, "no session event subscribers");
        }
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Moves the user to the login entry point.
pub trait Navigator: Send + Sync {
    fn navigate_to_login(&self) -> BoxFuture<'_, Result<()>>;

    /// Called for each `Refreshed` event, in order with expiries.
    fn session_refreshed(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Clears credentials and announces the expired session.
pub struct SessionExpiryHandler {
    store: Arc<dyn CredentialStore>,
    events: SessionEvents,
}

impl SessionExpiryHandler {
    pub fn new(store: Arc<dyn CredentialStore>, events: SessionEvents) -> Self {
        Self { store, events }
    }

    /// Best-effort: clear both tokens, then emit `Expired`. Never fails.
    pub async fn expire(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear credentials after session expiry");
        }
        metrics::counter!("session_expired_total").increment(1);
        info!("session expired, login required");
        self.events.emit(SessionEvent::Expired);
    }
}

/// Spawn the single consumer that applies session events to `navigator`.
///
/// Events are handled in emission order. Each one is checked against `store`
/// before it is applied: an `Expired` that arrives after new credentials were
/// installed does not navigate, and a `Refreshed` that arrives after the
/// session was cleared is ignored.
///
/// Subscribes before returning, so no event emitted after this call is missed.
/// The task ends when every `SessionEvents` sender is dropped.
pub fn spawn_navigation_task(
    events: &SessionEvents,
    navigator: Arc<dyn Navigator>,
    store: Arc<dyn CredentialStore>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(SessionEvent::Expired) => {
                    if has_session(store.as_ref()).await {
                        debug!("credentials replaced before expiry was handled, not navigating");
                    } else if let Err(e) = navigator.navigate_to_login().await {
                        warn!(error = %e, "login navigation failed");
                    }
                }
                Ok(SessionEvent::Refreshed) => {
                    if !has_session(store.as_ref()).await {
                        debug!("session cleared before refresh was handled, ignoring");
                    } else if let Err(e) = navigator.session_refreshed().await {
                        warn!(error = %e, "refresh notification failed");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "navigation task fell behind session events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn has_session(store: &dyn CredentialStore) -> bool {
    store
        .get(TokenKey::Access)
        .await
        .is_some_and(|t| !t.expose_str().is_empty())
}
