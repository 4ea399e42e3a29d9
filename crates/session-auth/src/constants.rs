//! Session credential constants
//!
//! Storage keys match the names the web client persists tokens under, so a
//! credential file can be seeded from an exported browser session.

/// Storage key for the short-lived access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Authorization value sent when no access token is stored. Not a valid
/// credential; the server decides what an unauthenticated call may do.
pub const BEARER_PLACEHOLDER: &str = "Bearer";

/// Refresh endpoint path appended to the API base URL when none is configured
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Login entry point used when none is configured
pub const DEFAULT_LOGIN_PATH: &str = "/login";
