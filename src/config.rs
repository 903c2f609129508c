//! Client configuration

use crate::error::{ClientError, Result};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REFRESH_PATH: &str = "api/auth/refresh/";

/// Environment variable overriding the API origin
pub const BASE_URL_ENV: &str = "KANBAN_API_URL";
/// Environment variable setting a per-request timeout in seconds
pub const TIMEOUT_ENV: &str = "KANBAN_API_TIMEOUT_SECS";

/// Configuration for the session client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin every request path is resolved against
    /// Default: `http://localhost:8000`
    pub base_url: String,

    /// Token refresh endpoint, relative to `base_url`
    /// Default: `api/auth/refresh/`
    pub refresh_path: String,

    /// Per-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,

    /// `User-Agent` header sent with every request
    /// Default: `kanban-client/<crate version>`
    pub user_agent: String,

    /// Share a single in-flight refresh between concurrent requests that
    /// hit 401 at the same time. Off by default: each request refreshes
    /// on its own.
    pub coalesce_refresh: bool,
}

impl ClientConfig {
    /// Defaults pointed at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Build from `KANBAN_API_URL` and `KANBAN_API_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            config.base_url = base_url;
        }

        if let Some(raw) = lookup(TIMEOUT_ENV) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ClientError::Configuration(format!("{TIMEOUT_ENV} must be a whole number of seconds, got {raw:?}"))
            })?;
            config.timeout = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Fail requests that take longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the refresh endpoint; an absolute URL is used as is
    pub fn with_refresh_path(mut self, refresh_path: impl Into<String>) -> Self {
        self.refresh_path = refresh_path.into();
        self
    }

    /// Toggle sharing one in-flight refresh between concurrent requests
    pub fn with_coalesced_refresh(mut self, coalesce: bool) -> Self {
        self.coalesce_refresh = coalesce;
        self
    }

    /// Parse `base_url` into a directory-style URL that paths can be joined onto
    pub fn parsed_base_url(&self) -> Result<Url> {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ClientError::Configuration("base_url is required".to_string()));
        }

        let url = Url::parse(&format!("{trimmed}/"))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ClientError::Configuration(format!(
                "base_url must use http or https, got {other}"
            ))),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            timeout: None,
            user_agent: concat!("kanban-client/", env!("CARGO_PKG_VERSION")).to_string(),
            coalesce_refresh: false,
        }
    }
}

/// Resolve an API path against the base URL
///
/// Leading slashes are ignored so `"/api/tasks/"` and `"api/tasks/"` land
/// on the same endpoint underneath any path prefix of the base URL.
pub(crate) fn resolve(base: &Url, path: &str) -> Result<Url> {
    Ok(base.join(path.trim_start_matches('/'))?)
}
