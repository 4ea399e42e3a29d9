//! Session token refresh
//!
//! Exchanges the stored refresh token for a new access/refresh pair. The
//! refresh endpoint lives on the same API as the requests being retried and
//! takes a JSON body:
//!
//! ```text
//! POST <refresh_url>   {"refreshToken": "..."}
//! 200                  {"accessToken": "...", "refreshToken": "..."}
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::BoxFuture;
use crate::credentials::{CredentialStore, TokenKey, TokenPair};
use crate::error::{Error, Result};

/// Response from the refresh endpoint.
///
/// The web API answers in camelCase; snake_case is accepted for OAuth-style
/// servers.
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    #[serde(alias = "access_token")]
    pub access_token: String,
    #[serde(alias = "refresh_token")]
    pub refresh_token: String,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Exchange a refresh token for a new token pair.
///
/// 401/403 from the endpoint means the refresh token itself is expired or
/// revoked. Nothing is written anywhere; the caller decides what to store.
pub async fn exchange_refresh_token(
    client: &reqwest::Client,
    endpoint: &str,
    refresh: &str,
    timeout: Duration,
) -> Result<TokenResponse> {
    let response = client
        .post(endpoint)
        .json(&RefreshRequest {
            refresh_token: refresh,
        })
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(timeout)
            } else {
                Error::Http(format!("token refresh request failed: {e}"))
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}

/// Rotates the stored token pair.
///
/// On `Ok` both tokens in the store have been replaced. On `Err` the store
/// is exactly as it was before the call.
pub trait TokenRefresher: Send + Sync {
    fn refresh(&self) -> BoxFuture<'_, Result<()>>;
}

/// Refresher that calls the remote refresh endpoint.
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    store: Arc<dyn CredentialStore>,
}

impl HttpTokenRefresher {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        timeout: Duration,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout,
            store,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn rotate(&self) -> Result<()> {
        let refresh = self
            .store
            .get(TokenKey::Refresh)
            .await
            .ok_or(Error::MissingRefreshToken)?;

        debug!(endpoint = %self.endpoint, "exchanging refresh token");
        let tokens = match exchange_refresh_token(
            &self.client,
            &self.endpoint,
            refresh.expose_str(),
            self.timeout,
        )
        .await
        {
            Ok(t) => t,
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "token refresh failed");
                return Err(e);
            }
        };

        self.store
            .replace(TokenPair::new(tokens.access_token, tokens.refresh_token))
            .await?;
        info!("session tokens refreshed");
        Ok(())
    }
}

impl TokenRefresher for HttpTokenRefresher {
    fn refresh(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.rotate())
    }
}
