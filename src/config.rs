//! Session configuration and URL resolution.

use std::time::Duration;

use url::Url;

use crate::error::Result;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default interval between import-run status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

const USER_AGENT: &str = concat!("molgenis-client/", env!("CARGO_PKG_VERSION"));

/// Configuration for a [`Session`](crate::Session).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use molgenis_client::SessionConfig;
///
/// let config = SessionConfig::new("https://molgenis.example.org/api/")
///     .with_token("abc123")
///     .with_poll_interval(Duration::from_secs(1));
/// assert_eq!(config.url, "https://molgenis.example.org/api/");
/// ```
#[derive(Clone)]
pub struct SessionConfig {
    /// Server URL, with or without a trailing `/api` segment.
    pub url: String,
    /// Pre-issued authentication token.
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Delay before each import-run status check.
    pub poll_interval: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl SessionConfig {
    /// Create a configuration for the given server URL with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            user_agent: USER_AGENT.to_string(),
        }
    }

    /// Use an existing authentication token instead of logging in.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the delay between import-run status checks.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Resolve a server URL into its `(root_url, api_url)` pair.
///
/// Older callers pass the URL with an `/api` suffix, newer ones without.
/// Both forms, with or without a trailing slash, resolve to the same pair:
/// `https://host/` and `https://host/api/`.
pub fn resolve_urls(url: &str) -> Result<(Url, Url)> {
    let trimmed = url.trim_end_matches('/');
    let root = trimmed
        .strip_suffix("/api")
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    let root_url = Url::parse(&format!("{root}/"))?;
    let api_url = root_url.join("api/")?;
    Ok((root_url, api_url))
}
