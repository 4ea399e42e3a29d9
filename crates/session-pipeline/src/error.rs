//! Error types for pipeline operations

/// Errors from the refresh coordinator and the navigation collaborator.
///
/// `Clone` because one refresh outcome is handed to every request waiting on
/// the same single-flight refresh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("navigation failed: {0}")]
    Navigation(String),
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
