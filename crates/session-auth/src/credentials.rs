//! Credential storage for the session token pair
//!
//! The store is an opaque key-value holder for two keys: the access token and
//! the refresh token. `replace` and `clear` write both keys under one lock
//! acquisition and one persist, so readers never observe a half-rotated pair.
//!
//! `FileCredentialStore` persists to a JSON file using atomic temp-file +
//! rename so the session survives process restarts. `MemoryCredentialStore`
//! keeps the pair in memory only.

use std::fmt;
use std::path::{Path, PathBuf};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::BoxFuture;
use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::error::{Error, Result};

/// The two logical keys held by a credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKey {
    Access,
    Refresh,
}

impl TokenKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKey::Access => ACCESS_TOKEN_KEY,
            TokenKey::Refresh => REFRESH_TOKEN_KEY,
        }
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An access/refresh pair written as a unit.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: Secret<String>,
    pub refresh: Secret<String>,
}

impl TokenPair {
    pub fn new(access: impl Into<Secret<String>>, refresh: impl Into<Secret<String>>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

/// Persisted credential holder shared by the request stamp, the refresher,
/// and the session expiry handler.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn CredentialStore>`).
pub trait CredentialStore: Send + Sync {
    /// Read one token. `None` when absent.
    fn get(&self, key: TokenKey) -> BoxFuture<'_, Option<Secret<String>>>;

    /// Write one token.
    fn set(&self, key: TokenKey, value: Secret<String>) -> BoxFuture<'_, Result<()>>;

    /// Remove one token. Removing an absent token is not an error.
    fn remove(&self, key: TokenKey) -> BoxFuture<'_, Result<()>>;

    /// Overwrite both tokens in a single write. Either both change or neither.
    fn replace(&self, pair: TokenPair) -> BoxFuture<'_, Result<()>>;

    /// Remove both tokens in a single write.
    fn clear(&self) -> BoxFuture<'_, Result<()>>;
}

/// On-disk and in-memory shape of the pair. Keys match `TokenKey::as_str`.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoredTokens {
    #[serde(rename = "accessToken", default, skip_serializing_if = "Option::is_none")]
    access: Option<String>,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    refresh: Option<String>,
}

impl StoredTokens {
    fn slot(&mut self, key: TokenKey) -> &mut Option<String> {
        match key {
            TokenKey::Access => &mut self.access,
            TokenKey::Refresh => &mut self.refresh,
        }
    }

    fn read(&self, key: TokenKey) -> Option<Secret<String>> {
        let value = match key {
            TokenKey::Access => self.access.as_ref(),
            TokenKey::Refresh => self.refresh.as_ref(),
        };
        value.map(|v| Secret::new(v.clone()))
    }

    fn from_pair(pair: &TokenPair) -> Self {
        Self {
            access: Some(pair.access.expose().clone()),
            refresh: Some(pair.refresh.expose().clone()),
        }
    }

    fn count(&self) -> usize {
        usize::from(self.access.is_some()) + usize::from(self.refresh.is_some())
    }
}

/// In-process credential store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: Mutex<StoredTokens>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a pair already installed.
    pub fn with_tokens(access: &str, refresh: &str) -> Self {
        Self {
            state: Mutex::new(StoredTokens {
                access: Some(access.to_owned()),
                refresh: Some(refresh.to_owned()),
            }),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: TokenKey) -> BoxFuture<'_, Option<Secret<String>>> {
        Box::pin(async move { self.state.lock().await.read(key) })
    }

    fn set(&self, key: TokenKey, value: Secret<String>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.state.lock().await.slot(key) = Some(value.expose().clone());
            Ok(())
        })
    }

    fn remove(&self, key: TokenKey) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.state.lock().await.slot(key) = None;
            Ok(())
        })
    }

    fn replace(&self, pair: TokenPair) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.state.lock().await = StoredTokens::from_pair(&pair);
            Ok(())
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.state.lock().await = StoredTokens::default();
            Ok(())
        })
    }
}

/// JSON-file credential store.
///
/// The Mutex serializes all writes. Each mutation is applied to a copy, the
/// copy is persisted, and only then does it become the in-memory state, so a
/// failed write leaves both disk and memory on the previous pair.
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<StoredTokens>,
}

impl FileCredentialStore {
    /// Load the pair from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (no session yet). Every
    /// request will carry the placeholder authorization until a login installs
    /// a pair.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let tokens: StoredTokens = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), tokens = tokens.count(), "loaded session credentials");
            tokens
        } else {
            info!(path = %path.display(), "credential file not found, starting without a session");
            let tokens = StoredTokens::default();
            write_atomic(&path, &tokens).await?;
            tokens
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn update(&self, f: impl FnOnce(&mut StoredTokens) + Send) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        f(&mut next);
        if next == *state {
            return Ok(());
        }
        write_atomic(&self.path, &next).await?;
        *state = next;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: TokenKey) -> BoxFuture<'_, Option<Secret<String>>> {
        Box::pin(async move { self.state.lock().await.read(key) })
    }

    fn set(&self, key: TokenKey, value: Secret<String>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.update(|tokens| *tokens.slot(key) = Some(value.expose().clone()))
                .await?;
            debug!(%key, "stored token");
            Ok(())
        })
    }

    fn remove(&self, key: TokenKey) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.update(|tokens| *tokens.slot(key) = None).await?;
            debug!(%key, "removed token");
            Ok(())
        })
    }

    fn replace(&self, pair: TokenPair) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.update(|tokens| *tokens = StoredTokens::from_pair(&pair))
                .await?;
            debug!("replaced token pair");
            Ok(())
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.update(|tokens| *tokens = StoredTokens::default())
                .await?;
            debug!("cleared token pair");
            Ok(())
        })
    }
}

/// Write the pair to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 since the file holds bearer
/// credentials.
async fn write_atomic(path: &Path, data: &StoredTokens) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
