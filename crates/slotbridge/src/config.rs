//! Pool configuration.

use serde::{Deserialize, Serialize};

pub const DEFAULT_POOL_SIZE: usize = 4;
pub const DEFAULT_THREAD_NAME: &str = "slotbridge";

pub const ENV_POOL_SIZE: &str = "SLOTBRIDGE_POOL_SIZE";
pub const ENV_THREAD_NAME: &str = "SLOTBRIDGE_THREAD_NAME";
pub const ENV_ERROR_POLICY: &str = "SLOTBRIDGE_ERROR_POLICY";

/// What happens to a slot that saw an operation error during a borrow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Return it to the pool as-is.
    #[default]
    Recycle,
    /// Shut its worker down on release; pool capacity drops by one.
    Quarantine,
}

impl std::str::FromStr for ErrorPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recycle" => Ok(Self::Recycle),
            "quarantine" => Ok(Self::Quarantine),
            other => Err(ConfigError::Invalid {
                key: ENV_ERROR_POLICY,
                reason: format!("unknown error policy '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("pool size must be at least 1")]
    ZeroSize,
    #[error("worker thread name must not be empty")]
    EmptyThreadName,
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Number of slots (worker threads and connections).
    pub size: usize,
    /// Prefix for worker thread names; threads are `{thread_name}-{index}`.
    pub thread_name: String,
    pub on_error: ErrorPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            on_error: ErrorPolicy::default(),
        }
    }
}

impl PoolConfig {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size == 0 {
            return Err(ConfigError::ZeroSize);
        }
        if self.thread_name.trim().is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }
        Ok(())
    }

    /// Defaults overridden by `SLOTBRIDGE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each known key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(size) = lookup(ENV_POOL_SIZE) {
            config.size = size.trim().parse().map_err(|e| ConfigError::Invalid {
                key: ENV_POOL_SIZE,
                reason: format!("{}", e),
            })?;
        }
        if let Some(name) = lookup(ENV_THREAD_NAME) {
            config.thread_name = name;
        }
        if let Some(policy) = lookup(ENV_ERROR_POLICY) {
            config.on_error = policy.parse()?;
        }

        config.validate()?;
        Ok(config)
    }
}
