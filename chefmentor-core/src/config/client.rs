//! Gateway configuration.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};

use super::settings::{Settings, Timeouts};

/// Path of the token refresh endpoint, relative to the base URL.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Configuration the [`ApiClient`](crate::http::ApiClient) is built with.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Prefix for all relative request paths.
    pub base_url: String,
    /// Per-category timeouts. `timeouts.general` applies unless a call overrides it.
    pub timeouts: Timeouts,
    /// Headers sent with every request unless a call overrides them.
    pub default_headers: HeaderMap,
    /// Refresh endpoint path.
    pub refresh_path: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Self {
            base_url: base_url.into(),
            timeouts: Timeouts::default(),
            default_headers,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
        }
    }

    /// Build from persisted settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.api_url()).with_timeouts(settings.timeouts())
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.general = timeout;
        self
    }

    pub fn with_default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Default timeout for a request without an override.
    pub fn timeout(&self) -> Duration {
        self.timeouts.general
    }
}
