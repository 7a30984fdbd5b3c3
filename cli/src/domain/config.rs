//! Domain types for Flotilla configuration.
//!
//! Pure functions only — no I/O, no async, no filesystem access.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

pub const DEFAULT_API_BASE_URL: &str = "https://api.machines.dev";
pub const DEFAULT_SSH_USER: &str = "root";

// ── User config schema ───────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.flotilla/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FlotillaConfig {
    pub api: ApiConfig,
    pub defaults: DefaultsConfig,
    pub timeouts: TimeoutsConfig,
}

impl FlotillaConfig {
    /// Copy of the config that is safe to print.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.api.token.is_some() {
            copy.api.token = Some("<redacted>".to_string());
        }
        copy
    }
}

/// Keys accepted by `flotilla config set`.
pub const SETTABLE_KEYS: [&str; 7] = [
    "api.base_url",
    "api.token",
    "defaults.app",
    "defaults.ssh_user",
    "timeouts.update_wait_secs",
    "timeouts.start_wait_secs",
    "timeouts.teardown_secs",
];

impl FlotillaConfig {
    /// Set a single dotted key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownKey`] for keys outside [`SETTABLE_KEYS`]
    /// and [`ConfigError::InvalidValue`] for values that do not parse.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        let secs = || -> Result<u64, ConfigError> {
            match value.parse::<u64>() {
                Ok(0) | Err(_) => Err(invalid("expected a positive number of seconds")),
                Ok(n) => Ok(n),
            }
        };
        match key {
            "api.base_url" => {
                if !(value.starts_with("https://") || value.starts_with("http://")) {
                    return Err(invalid("expected an http(s) URL"));
                }
                self.api.base_url = value.trim_end_matches('/').to_string();
            }
            "api.token" => self.api.token = Some(value.to_string()).filter(|v| !v.is_empty()),
            "defaults.app" => self.defaults.app = Some(value.to_string()).filter(|v| !v.is_empty()),
            "defaults.ssh_user" => {
                if value.is_empty() || value.contains(char::is_whitespace) {
                    return Err(invalid("expected a user name"));
                }
                self.defaults.ssh_user = value.to_string();
            }
            "timeouts.update_wait_secs" => self.timeouts.update_wait_secs = secs()?,
            "timeouts.start_wait_secs" => self.timeouts.start_wait_secs = secs()?,
            "timeouts.teardown_secs" => self.timeouts.teardown_secs = secs()?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}

/// Platform API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            token: None,
        }
    }
}

/// Defaults applied when a flag is omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    pub ssh_user: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            app: None,
            ssh_user: DEFAULT_SSH_USER.to_string(),
        }
    }
}

/// Deadlines for the lifecycle operations, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub update_wait_secs: u64,
    pub start_wait_secs: u64,
    pub teardown_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            update_wait_secs: 300,
            start_wait_secs: 15,
            teardown_secs: 5,
        }
    }
}

impl TimeoutsConfig {
    #[must_use]
    pub fn update_wait(&self) -> Duration {
        Duration::from_secs(self.update_wait_secs)
    }

    #[must_use]
    pub fn start_wait(&self) -> Duration {
        Duration::from_secs(self.start_wait_secs)
    }

    #[must_use]
    pub fn teardown(&self) -> Duration {
        Duration::from_secs(self.teardown_secs)
    }
}

// ── App config schema ────────────────────────────────────────────────────────

/// Per-app settings read from `flotilla.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_region: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Command aliases: name → literal shell command.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub commands: BTreeMap<String, String>,
}

// ── Unit tests ───────────────────────────────────────────────────────────────
