//! Refresh coordination
//!
//! A burst of requests sent with the same expired token all come back 401 at
//! roughly the same time. In `SingleFlight` mode the first 401 starts the
//! refresh and publishes a shared handle; every 401 observed while that handle
//! is pending awaits the same refresh instead of starting its own. Once it
//! settles the handle is released, so a later 401 starts a fresh refresh.
//!
//! Every exchange runs on its own task. Dropping a waiter never aborts a
//! refresh that has already been sent, so a rotated pair is always stored.
//!
//! `Independent` mode runs one refresh per 401 with no coordination. Each
//! request is still bounded to a single retry by its own call context.
//!
//! A failed refresh expires the session from inside the flight, so one failed
//! exchange clears the credentials and requests login once no matter how many
//! calls were waiting on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use session_auth::TokenRefresher;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::expiry::{SessionEvent, SessionEvents, SessionExpiryHandler};

/// How concurrent refresh requests are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Concurrent 401s share one in-flight refresh.
    #[default]
    SingleFlight,
    /// Every 401 runs its own refresh.
    Independent,
}

type Flight = Shared<BoxFuture<'static, Result<()>>>;

struct InFlight {
    id: u64,
    flight: Flight,
}

/// Front door to the token refresher for the response stage.
pub struct RefreshCoordinator {
    refresher: Arc<dyn TokenRefresher>,
    expiry: Arc<SessionExpiryHandler>,
    events: SessionEvents,
    mode: RefreshMode,
    pending: Arc<Mutex<Option<InFlight>>>,
    next_id: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        refresher: Arc<dyn TokenRefresher>,
        expiry: Arc<SessionExpiryHandler>,
        events: SessionEvents,
        mode: RefreshMode,
    ) -> Self {
        info!(?mode, "refresh coordinator initialized");
        Self {
            refresher,
            expiry,
            events,
            mode,
            pending: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    /// Whether a single-flight refresh is currently pending.
    pub fn is_refreshing(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Refresh the stored token pair and wait for the outcome.
    ///
    /// On `Err` the session has already been expired.
    pub async fn refresh(&self) -> Result<()> {
        match self.mode {
            RefreshMode::Independent => self.flight(None).await,
            RefreshMode::SingleFlight => self.join_or_start().await,
        }
    }

    async fn join_or_start(&self) -> Result<()> {
        let flight = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.as_ref() {
                Some(current) => {
                    debug!(flight = current.id, "joining in-flight refresh");
                    metrics::counter!("session_refresh_coalesced_total").increment(1);
                    current.flight.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let flight = self.flight(Some(id)).shared();
                    *pending = Some(InFlight {
                        id,
                        flight: flight.clone(),
                    });
                    debug!(flight = id, "starting refresh");
                    flight
                }
            }
        };
        flight.await
    }

    /// Spawn one refresh exchange plus its side effects.
    ///
    /// The exchange runs as its own task, so it completes and its result is
    /// stored even if every caller waiting on it is dropped. With `release`
    /// set, the task unpublishes that single-flight slot once the side effects
    /// are done.
    fn flight(&self, release: Option<u64>) -> BoxFuture<'static, Result<()>> {
        let refresher = self.refresher.clone();
        let expiry = self.expiry.clone();
        let events = self.events.clone();
        let pending = self.pending.clone();
        let slot = self.pending.clone();
        let task = tokio::spawn(async move {
            let result = match refresher.refresh().await {
                Ok(()) => {
                    metrics::counter!("session_refresh_total", "outcome" => "success").increment(1);
                    events.emit(SessionEvent::Refreshed);
                    Ok(())
                }
                Err(e) => {
                    metrics::counter!("session_refresh_total", "outcome" => "failure").increment(1);
                    warn!(error = %e, "refresh exchange failed");
                    expiry.expire().await;
                    Err(Error::RefreshFailed(e.to_string()))
                }
            };
            release_slot(&pending, release);
            result
        });
        async move {
            task.await.unwrap_or_else(|e| {
                release_slot(&slot, release);
                Err(Error::RefreshFailed(format!("refresh task failed: {e}")))
            })
        }
        .boxed()
    }
}

/// Clear the single-flight slot if it still holds flight `id`.
fn release_slot(pending: &Mutex<Option<InFlight>>, id: Option<u64>) {
    let Some(id) = id else { return };
    let mut pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
    if pending.as_ref().is_some_and(|p| p.id == id) {
        *pending = None;
    }
}
