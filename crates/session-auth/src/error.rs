//! Error types for credential storage and token refresh

use std::time::Duration;

/// Errors from credential storage and the refresh exchange.
///
/// Every variant raised by the refresher means the store was left untouched.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("refresh request timed out after {0:?}")]
    Timeout(Duration),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
