//! Client configuration: defaults, TOML file, environment overrides.
//!
//! Recognized keys (TOML accepts both spellings):
//!
//! | key | env var | default |
//! |-----|---------|---------|
//! | `baseUrl` / `base_url` | `COURSES_BASE_URL` | `http://localhost:8080/api` |
//! | `connectTimeoutMs` / `connect_timeout_ms` | `COURSES_CONNECT_TIMEOUT_MS` | 2000 |
//! | `requestTimeoutMs` / `request_timeout_ms` | `COURSES_REQUEST_TIMEOUT_MS` | 5000 |
//! | `maxRetries` / `max_retries` | `COURSES_MAX_RETRIES` | 2 |
//!
//! `maxRetries` counts attempts after the first one and may not exceed
//! `MAX_RETRIES_LIMIT`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// Upper bound for `maxRetries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable {var}={value:?} is invalid: {reason}")]
    Env {
        var: String,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(alias = "base_url")]
    pub base_url: String,
    #[serde(alias = "connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(alias = "request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(alias = "max_retries")]
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_ms: 2_000,
            request_timeout_ms: 5_000,
            max_retries: 2,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Defaults, then `path` if given, then the process environment.
    /// The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `COURSES_*` variables from `vars`; other names are ignored.
    pub fn with_overrides<I>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (var, value) in vars {
            match var.as_str() {
                "COURSES_BASE_URL" => self.base_url = value,
                "COURSES_CONNECT_TIMEOUT_MS" => {
                    self.connect_timeout_ms = parse_number(&var, &value)?
                }
                "COURSES_REQUEST_TIMEOUT_MS" => {
                    self.request_timeout_ms = parse_number(&var, &value)?
                }
                "COURSES_MAX_RETRIES" => self.max_retries = parse_number(&var, &value)?,
                _ => {}
            }
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.base_url).map_err(|e| ConfigError::Invalid {
            field: "baseUrl",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "baseUrl",
                reason: format!("scheme `{}` is not http or https", url.scheme()),
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "connectTimeoutMs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "requestTimeoutMs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::Invalid {
                field: "maxRetries",
                reason: format!("is {} but at most {MAX_RETRIES_LIMIT} is allowed", self.max_retries),
            });
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_retries(self.max_retries)
    }
}

fn parse_number<N: std::str::FromStr>(var: &str, value: &str) -> Result<N, ConfigError>
where
    N::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: N::Err| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
