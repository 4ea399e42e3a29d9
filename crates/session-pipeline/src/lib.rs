//! Authenticated request pipeline
//!
//! Stamps every outgoing request with the stored access token and recovers
//! from expired sessions transparently. Callers hand `AuthPipeline::execute()`
//! a request and get back the final outcome; they never see token handling.
//!
//! Session lifecycle:
//! 1. Request stage stamps `Authorization: Bearer <access>` from the store
//! 2. Upstream answers 401 → the call moves to its retry attempt and the
//!    refresh coordinator rotates the token pair
//! 3. Refresh succeeds → the call is re-stamped and sent once more
//! 4. Refresh fails → credentials are cleared, `SessionEvent::Expired` is
//!    broadcast, and the caller gets the original 401
//! 5. One navigation task applies `Expired` and `Refreshed` events to a
//!    `Navigator`, in order and reconciled with the store

pub mod error;
pub mod expiry;
pub mod pipeline;
pub mod refresh;
pub mod stamp;

pub use error::{Error, Result};
pub use expiry::{
    Navigator, SessionEvent, SessionEvents, SessionExpiryHandler, spawn_navigation_task,
};
pub use pipeline::{Attempt, AuthPipeline, Call};
pub use refresh::{RefreshCoordinator, RefreshMode};
pub use stamp::{authorization_value, stamp_credential};
