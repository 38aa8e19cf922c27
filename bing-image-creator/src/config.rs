//! Client configuration

use crate::error::ImageCreatorError;
use std::time::Duration;

/// Default service origin
pub const DEFAULT_BASE_URL: &str = "https://www.bing.com";

/// Domain the authentication cookies belong to
pub const COOKIE_DOMAIN: &str = ".bing.com";

/// Environment variable holding a login page to show before interactive login
pub const ENV_LOGIN_URL: &str = "BING_LOGIN_URL";
/// Environment variable holding an outbound proxy URL
pub const ENV_PROXY: &str = "BING_PROXY";
/// Environment variable overriding the submission timeout
pub const ENV_CREATE_TIMEOUT: &str = "BING_CREATE_TIMEOUT";
/// Environment variable overriding the polling timeout
pub const ENV_POLL_TIMEOUT: &str = "BING_POLL_TIMEOUT";
/// Environment variable overriding the login timeout
pub const ENV_LOGIN_TIMEOUT: &str = "BING_LOGIN_TIMEOUT";

/// Settings for one [`ImageCreator`](crate::ImageCreator)
///
/// The struct is owned by the caller and passed in explicitly; nothing is read
/// from global state after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Service origin all endpoints are resolved against
    pub base_url: reqwest::Url,
    /// Cookie domain used for cookie store lookups
    pub cookie_domain: String,
    /// Outbound proxy for HTTP requests and the login browser
    pub proxy: Option<reqwest::Url>,
    /// Page shown to the user before interactive login starts
    pub login_url: Option<String>,
    /// Limit for each submission request
    pub submission_timeout: Duration,
    /// Limit for the whole polling loop
    pub polling_timeout: Duration,
    /// Pause between empty polling responses
    pub poll_interval: Duration,
    /// Limit for the interactive login
    pub login_timeout: Duration,
    /// Pause between login cookie checks
    pub login_poll_interval: Duration,
    /// Pause after login before the cookies are harvested
    pub login_settle: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            cookie_domain: COOKIE_DOMAIN.to_string(),
            proxy: None,
            login_url: None,
            submission_timeout: Duration::from_secs(300),
            polling_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            login_timeout: Duration::from_secs(1200),
            login_poll_interval: Duration::from_millis(500),
            login_settle: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    /// Build a config from the process environment
    ///
    /// Unset or empty variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ImageCreatorError::Config` if a proxy URL or a duration cannot be parsed.
    pub fn from_env() -> Result<Self, ImageCreatorError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ImageCreatorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.login_url = lookup(ENV_LOGIN_URL);
        if let Some(proxy) = lookup(ENV_PROXY) {
            let url = reqwest::Url::parse(proxy.trim())
                .map_err(|e| ImageCreatorError::Config(format!("{ENV_PROXY}: {e}")))?;
            config.proxy = Some(url);
        }
        if let Some(value) = lookup(ENV_CREATE_TIMEOUT) {
            config.submission_timeout = parse_duration(ENV_CREATE_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(ENV_POLL_TIMEOUT) {
            config.polling_timeout = parse_duration(ENV_POLL_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(ENV_LOGIN_TIMEOUT) {
            config.login_timeout = parse_duration(ENV_LOGIN_TIMEOUT, &value)?;
        }

        Ok(config)
    }
}

fn default_base_url() -> reqwest::Url {
    reqwest::Url::parse(DEFAULT_BASE_URL).expect("Default base URL should always be valid")
}

fn parse_duration(key: &str, value: &str) -> Result<Duration, ImageCreatorError> {
    humantime::parse_duration(value.trim())
        .map_err(|e| ImageCreatorError::Config(format!("{key}: {e}")))
}
