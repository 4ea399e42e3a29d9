//! Session credential storage and token refresh
//!
//! Holds the access/refresh token pair behind the `CredentialStore` trait and
//! performs the refresh exchange that rotates it. The pipeline crate depends
//! on the two traits only; the file-backed store and HTTP refresher are the
//! production implementations.
//!
//! Credential flow:
//! 1. Login completion installs a pair via `CredentialStore::replace()`
//! 2. Every outgoing request reads `TokenKey::Access`
//! 3. On a 401, `TokenRefresher::refresh()` exchanges `TokenKey::Refresh`
//!    for a new pair and replaces both tokens in one write
//! 4. If the exchange fails, the session is expired and the store cleared

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

use std::future::Future;
use std::pin::Pin;

pub use constants::*;
pub use credentials::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, TokenKey, TokenPair,
};
pub use error::{Error, Result};
pub use token::{HttpTokenRefresher, TokenRefresher, TokenResponse, exchange_refresh_token};

/// Boxed future used by the dyn-compatible traits in this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
