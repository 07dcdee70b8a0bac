//! Settings - TOML 設定ファイル
//!
//! すべての項目に既定値がある。ファイルが無ければ既定値のまま動く。
//!
//! ```toml
//! [scheduler]
//! max_concurrent = 5
//! retry_interval_ms = 500
//! max_retries = 0
//!
//! [login]
//! timeout_secs = 300
//! transient_budget = 60
//!
//! [storage]
//! history_path = "history.jsonl"
//! cookie_path = "cookies.json"
//!
//! [booking]
//! endpoint = "http://127.0.0.1:8080/claim"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::{ManagerConfig, RetryPolicy};
use crate::auth::LoginConfig;
use crate::domain::{ConfigError, TaskConfig};
use crate::impls::BookingEndpoint;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("task #{index}: {source}")]
    InvalidTask {
        index: usize,
        #[source]
        source: ConfigError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scheduler: SchedulerSettings,
    pub login: LoginSettings,
    pub storage: StorageSettings,
    pub booking: BookingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub max_concurrent: usize,
    pub retry_interval_ms: u64,
    /// 0 = unbounded.
    pub max_retries: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: ManagerConfig::DEFAULT_MAX_CONCURRENT,
            retry_interval_ms: RetryPolicy::DEFAULT_INTERVAL.as_millis() as u64,
            max_retries: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSettings {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub transient_budget: u32,
    pub network_retry_ms: u64,
    pub required_credential: String,
}

impl Default for LoginSettings {
    fn default() -> Self {
        let defaults = LoginConfig::default();
        Self {
            timeout_secs: defaults.timeout.as_secs(),
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            transient_budget: defaults.transient_budget,
            network_retry_ms: defaults.network_retry.as_millis() as u64,
            required_credential: defaults.required_credential,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub history_path: PathBuf,
    pub cookie_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            history_path: PathBuf::from("history.jsonl"),
            cookie_path: PathBuf::from("cookies.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingSettings {
    pub endpoint: String,
    pub request_timeout_secs: u64,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/claim".into(),
            request_timeout_secs: 10,
        }
    }
}

impl Settings {
    /// Load from `path`; `None` or a missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            max_concurrent: self.scheduler.max_concurrent,
            retry: RetryPolicy::fixed(
                Duration::from_millis(self.scheduler.retry_interval_ms),
                self.scheduler.max_retries,
            ),
        }
    }

    pub fn login_config(&self) -> LoginConfig {
        LoginConfig {
            timeout: Duration::from_secs(self.login.timeout_secs),
            poll_interval: Duration::from_millis(self.login.poll_interval_ms),
            transient_budget: self.login.transient_budget,
            network_retry: Duration::from_millis(self.login.network_retry_ms),
            required_credential: self.login.required_credential.clone(),
        }
    }

    pub fn booking_endpoint(&self) -> BookingEndpoint {
        BookingEndpoint {
            url: self.booking.endpoint.clone(),
            request_timeout: Duration::from_secs(self.booking.request_timeout_secs),
        }
    }
}

/// Task definitions file: a list of `[[task]]` tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFile {
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskConfig>,
}

impl TaskFile {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Validate every task; the first failure is reported with its 1-based position.
    pub fn validate(&self) -> Result<(), SettingsError> {
        for (index, task) in self.tasks.iter().enumerate() {
            task.validate().map_err(|source| SettingsError::InvalidTask {
                index: index + 1,
                source,
            })?;
        }
        Ok(())
    }
}
