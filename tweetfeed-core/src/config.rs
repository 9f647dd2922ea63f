//! Application configuration.
//!
//! Settings come from a TOML file (`--config <path>`, or `tweetfeed.toml` in
//! the working directory when present) layered under environment variables
//! for credentials. Every table is optional; missing keys fall back to the
//! defaults below.
//!
//! ```toml
//! [api]
//! bearer_token = "AAAA..."
//! owner_user_id = "783214"
//!
//! [rate_limits]
//! window_minutes = 15
//! user_posts_per_window = 1500
//!
//! [polling]
//! idle_interval_secs = 60
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_CONFIG_FILE: &str = "tweetfeed.toml";

/// Longest rate window accepted from configuration.
pub const MAX_WINDOW_MINUTES: u64 = 24 * 60;

pub const ENV_BEARER_TOKEN: &str = "TWITTER_BEARER_TOKEN";
pub const ENV_CLIENT_ID: &str = "TWITTER_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "TWITTER_CLIENT_SECRET";
pub const ENV_OWNER_USER_ID: &str = "TWITTER_OWNER_USER_ID";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub rate_limits: RateLimitsConfig,
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token_url: String,
    pub bearer_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Account whose owned lists are searched when a list is selected by name.
    pub owner_user_id: Option<String>,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.twitter.com".to_string(),
            token_url: "https://api.twitter.com/oauth2/token".to_string(),
            bearer_token: None,
            client_id: None,
            client_secret: None,
            owner_user_id: None,
            user_agent: format!("tweetfeed/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
        }
    }
}

/// Per-window call budgets, one per endpoint family. Defaults follow the
/// platform's published app-auth limits for a 15 minute window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    pub window_minutes: u64,
    pub followees_per_window: u32,
    pub list_members_per_window: u32,
    pub owned_lists_per_window: u32,
    pub users_lookup_per_window: u32,
    pub user_posts_per_window: u32,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            window_minutes: 15,
            followees_per_window: 15,
            list_members_per_window: 900,
            owned_lists_per_window: 15,
            users_lookup_per_window: 300,
            user_posts_per_window: 1500,
        }
    }
}

impl RateLimitsConfig {
    pub fn window_length(&self) -> Duration {
        Duration::from_secs(self.window_minutes.saturating_mul(60))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Sleep between cycles that produced no new posts.
    pub idle_interval_secs: u64,
    pub posts_per_page: u32,
    /// Emit the posts already present on an account's first poll instead of
    /// only using them to set the starting cursor.
    pub emit_backlog: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: 60,
            posts_per_page: 100,
            emit_backlog: false,
        }
    }
}

impl PollingConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }
}

impl AppConfig {
    /// Loads the explicit path, or the default file when it exists, or defaults.
    /// Environment overrides are applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_file(&default_path)?
                } else {
                    debug!("No {} found, using default configuration", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
                path: path.display().to_string(),
            })?;
        info!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Overrides credentials from the environment. `lookup` is `std::env::var`
    /// outside of tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty(ENV_BEARER_TOKEN) {
            self.api.bearer_token = Some(token);
        }
        if let Some(id) = non_empty(ENV_CLIENT_ID) {
            self.api.client_id = Some(id);
        }
        if let Some(secret) = non_empty(ENV_CLIENT_SECRET) {
            self.api.client_secret = Some(secret);
        }
        if let Some(owner) = non_empty(ENV_OWNER_USER_ID) {
            self.api.owner_user_id = Some(owner);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.rate_limits;
        if limits.window_minutes == 0 || limits.window_minutes > MAX_WINDOW_MINUTES {
            return Err(invalid("rate_limits.window_minutes", limits.window_minutes));
        }
        for (field, budget) in [
            ("rate_limits.followees_per_window", limits.followees_per_window),
            ("rate_limits.list_members_per_window", limits.list_members_per_window),
            ("rate_limits.owned_lists_per_window", limits.owned_lists_per_window),
            ("rate_limits.users_lookup_per_window", limits.users_lookup_per_window),
            ("rate_limits.user_posts_per_window", limits.user_posts_per_window),
        ] {
            if budget == 0 {
                return Err(invalid(field, budget));
            }
        }

        // The timeline endpoint accepts 5..=100 results per page.
        if !(5..=100).contains(&self.polling.posts_per_page) {
            return Err(invalid("polling.posts_per_page", self.polling.posts_per_page));
        }
        if self.api.timeout_secs == 0 {
            return Err(invalid("api.timeout_secs", self.api.timeout_secs));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}
