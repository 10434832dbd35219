//! Client configuration.
//!
//! Loaded from `config.json` under the base directory, falling back to
//! defaults, then overridden from the environment.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/api/v1/ws";
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api/v1";

pub const ENV_LOG_LEVEL: &str = "TASKPULSE_LOG_LEVEL";
pub const ENV_WS_URL: &str = "TASKPULSE_WS_URL";
pub const ENV_API_URL: &str = "TASKPULSE_API_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// trace, debug, info, warn or error.
    pub log_level: String,
    /// Base WebSocket endpoint. Credentials are appended per connection.
    pub ws_url: String,
    /// REST base used for the initial sync and read receipts.
    pub api_url: String,
    pub heartbeat_interval_secs: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    /// `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Recycle a connection that has been silent this long. `None` disables it.
    pub idle_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            heartbeat_interval_secs: 30,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 10_000,
            max_reconnect_attempts: None,
            idle_timeout_secs: Some(75),
        }
    }
}

impl Config {
    /// Load from `paths`, or use defaults when the file is absent.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;

        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply overrides; blank values are ignored.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(level) = read(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(url) = read(ENV_WS_URL) {
            self.ws_url = url;
        }
        if let Some(url) = read(ENV_API_URL) {
            self.api_url = url;
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.ws_url()?;
        self.api_url()?;

        if self.heartbeat_interval_secs == 0 {
            return Err(CoreError::Config(
                "heartbeat_interval_secs must be positive".to_string(),
            ));
        }
        if self.reconnect_base_delay_ms == 0
            || self.reconnect_base_delay_ms > self.reconnect_max_delay_ms
        {
            return Err(CoreError::Config(format!(
                "reconnect delays must satisfy 0 < base ({}) <= max ({})",
                self.reconnect_base_delay_ms, self.reconnect_max_delay_ms
            )));
        }
        Ok(())
    }

    /// The WebSocket endpoint; must be `ws` or `wss`.
    pub fn ws_url(&self) -> CoreResult<Url> {
        parse_with_scheme(&self.ws_url, &["ws", "wss"])
    }

    /// The REST base; must be `http` or `https`.
    pub fn api_url(&self) -> CoreResult<Url> {
        parse_with_scheme(&self.api_url, &["http", "https"])
    }
}

fn parse_with_scheme(raw: &str, schemes: &[&str]) -> CoreResult<Url> {
    let url = Url::parse(raw)?;
    if !schemes.contains(&url.scheme()) {
        return Err(CoreError::Config(format!(
            "unsupported scheme '{}' in {raw}, expected one of {schemes:?}",
            url.scheme()
        )));
    }
    Ok(url)
}
