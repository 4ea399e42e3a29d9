//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Tokens never appear in the TOML; they live in the credentials file and
//! arrive through the admin API.

use serde::Deserialize;
use session_auth::{DEFAULT_LOGIN_PATH, DEFAULT_REFRESH_PATH};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub proxy: ProxyConfig,
    pub session: SessionConfig,
}

/// HTTP proxy settings
#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_admin_addr")]
    pub admin_addr: SocketAddr,
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Session credential settings
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    pub credentials_path: PathBuf,
    /// Defaults to `<base_url>/auth/refresh` when unset.
    #[serde(default)]
    pub refresh_url: Option<String>,
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_coalesce_refresh")]
    pub coalesce_refresh: bool,
}

fn default_admin_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_connections() -> usize {
    1000
}

fn default_login_url() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}

fn default_coalesce_refresh() -> bool {
    true
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// `API_BASE_URL` replaces `proxy.base_url`. The refresh URL default is
    /// derived after the overlay so it follows the effective base URL.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(base_url) = std::env::var("API_BASE_URL") {
            config.proxy.base_url = base_url;
        }
        config.proxy.base_url = config.proxy.base_url.trim_end_matches('/').to_string();

        if !is_http_url(&config.proxy.base_url) {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.proxy.base_url
            )));
        }

        if let Some(url) = config.session.refresh_url.as_deref().filter(|u| !is_http_url(u)) {
            return Err(common::Error::Config(format!(
                "refresh_url must start with http:// or https://, got: {url}"
            )));
        }

        if config.proxy.timeout_ms == 0 {
            return Err(common::Error::Config(
                "timeout_ms must be greater than 0".into(),
            ));
        }

        if config.proxy.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("session-proxy.toml")
    }

    /// Per-call timeout shared by forwarded requests and the refresh call.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.proxy.timeout_ms)
    }

    pub fn refresh_url(&self) -> String {
        self.session
            .refresh_url
            .clone()
            .unwrap_or_else(|| format!("{}{DEFAULT_REFRESH_PATH}", self.proxy.base_url))
    }
}
