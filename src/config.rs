//! Configuration management for dc-advisor.
//!
//! Configuration can be set via environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `APP_ORIGIN` - Optional. Public origin used to build the OAuth redirect URI.
//!   Defaults to `http://{HOST}:{PORT}`.
//! - `DATA_DIR` - Optional. Directory for persisted tokens. Defaults to `./.dc-advisor`.
//! - `OAUTH_BASE_URL` - Optional. Authorization server. Defaults to `https://accounts.zoho.eu`.
//! - `AGENT_API_BASE_URL` - Optional. Agent platform API. Defaults to `https://beta-cloud.integrail.ai/api`.
//! - `AGENT_ACCOUNT_ID` - Agent platform account id.
//! - `AGENT_ID` - Agent to execute.
//! - `AGENT_BEARER_TOKEN` - Service credential for the agent platform.
//! - `AGENT_POLL_INTERVAL_MS` - Optional. Delay between status polls. Defaults to `1000`.
//! - `AGENT_MAX_POLL_ATTEMPTS` - Optional. Polls before giving up. Defaults to `300`.
//! - `AGENT_MAX_POLL_FAILURES` - Optional. Consecutive failed-poll count at which the error surfaces. Defaults to `3`.
//!
//! The three agent credentials are optional at load time; a missing one is
//! reported when a prompt is submitted.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default authorization server (Zoho EU data center).
pub const DEFAULT_OAUTH_BASE_URL: &str = "https://accounts.zoho.eu";

/// Default agent platform API root.
pub const DEFAULT_AGENT_API_BASE_URL: &str = "https://beta-cloud.integrail.ai/api";

/// Path the authorization server redirects back to.
pub const OAUTH_CALLBACK_PATH: &str = "/oauth/callback";

/// Scopes requested from Desktop Central.
pub const OAUTH_SCOPE: &str =
    "DesktopCentralCloud.Common.READ,DesktopCentralCloud.Common.Update,DesktopCentralCloud.Inventory.READ";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// OAuth settings for the Desktop Central gateway.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Authorization server base URL
    pub base_url: String,
    /// Origin of this app; the redirect URI is `{app_origin}/oauth/callback`
    pub app_origin: String,
    /// Space-free, comma separated scope string
    pub scope: String,
}

impl OAuthConfig {
    pub fn new(base_url: impl Into<String>, app_origin: impl Into<String>) -> Self {
        Self {
            base_url: trim_trailing_slashes(base_url.into()),
            app_origin: trim_trailing_slashes(app_origin.into()),
            scope: OAUTH_SCOPE.to_string(),
        }
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.app_origin, OAUTH_CALLBACK_PATH)
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/oauth/v2/auth", self.base_url)
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/v2/token", self.base_url)
    }
}

/// Agent platform settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// API root, e.g. `https://beta-cloud.integrail.ai/api`
    pub base_url: String,

    pub account_id: Option<String>,

    pub agent_id: Option<String>,

    /// Service-level bearer credential for the agent platform.
    /// Not the user's Desktop Central token.
    pub service_token: Option<String>,

    /// Delay before each status poll
    pub poll_interval: Duration,

    /// Number of status polls before giving up
    pub max_poll_attempts: u32,

    /// Consecutive transient poll failure count at which the error surfaces
    pub max_consecutive_poll_failures: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_AGENT_API_BASE_URL.to_string(),
            account_id: None,
            agent_id: None,
            service_token: None,
            poll_interval: Duration::from_millis(1000),
            max_poll_attempts: 300,
            max_consecutive_poll_failures: 3,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Directory holding persisted tokens
    pub data_dir: PathBuf,

    pub oauth: OAuthConfig,

    pub agent: AgentConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = parse_env("PORT", 3000u16)?;

        let app_origin =
            std::env::var("APP_ORIGIN").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".dc-advisor"));

        let oauth_base = std::env::var("OAUTH_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_OAUTH_BASE_URL.to_string());

        let agent = AgentConfig {
            base_url: trim_trailing_slashes(
                std::env::var("AGENT_API_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_AGENT_API_BASE_URL.to_string()),
            ),
            account_id: non_empty_env("AGENT_ACCOUNT_ID"),
            agent_id: non_empty_env("AGENT_ID"),
            service_token: non_empty_env("AGENT_BEARER_TOKEN"),
            poll_interval: Duration::from_millis(parse_env("AGENT_POLL_INTERVAL_MS", 1000u64)?),
            max_poll_attempts: parse_env("AGENT_MAX_POLL_ATTEMPTS", 300u32)?,
            max_consecutive_poll_failures: parse_env("AGENT_MAX_POLL_FAILURES", 3u32)?,
        };

        if agent.max_poll_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "AGENT_MAX_POLL_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            data_dir,
            oauth: OAuthConfig::new(oauth_base, app_origin),
            agent,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(data_dir: PathBuf, oauth: OAuthConfig, agent: AgentConfig) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            data_dir,
            oauth,
            agent,
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

fn trim_trailing_slashes(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
