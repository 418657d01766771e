//! Bridge configuration.
//!
//! Settings come from code through the `with_*` builders or from the
//! environment through [`BridgeConfig::from_env`]:
//!
//! - `HOSTBRIDGE_WORKERS`: worker thread count
//! - `HOSTBRIDGE_BLOCK_POLICY`: `block`, `warn` or `error`
//! - `HOSTBRIDGE_DEBUG`: comma-separated log categories
//!   (`init,store,object,lock,task,resolve`)

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors reading configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid worker count {value:?}: expected a positive integer")]
    InvalidWorkers { value: String },

    #[error("invalid block policy {value:?}: expected block, warn or error")]
    InvalidBlockPolicy { value: String },

    #[error("unknown debug category {value:?}")]
    UnknownCategory { value: String },
}

/// What a synchronous call does when an object it needs is busy with an
/// asynchronous call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockPolicy {
    /// Wait for the object
    #[default]
    Block,
    /// Log a warning, then wait
    Warn,
    /// Fail the call
    Error,
}

impl FromStr for BlockPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(BlockPolicy::Block),
            "warn" => Ok(BlockPolicy::Warn),
            "error" => Ok(BlockPolicy::Error),
            _ => Err(ConfigError::InvalidBlockPolicy {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for BlockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockPolicy::Block => write!(f, "block"),
            BlockPolicy::Warn => write!(f, "warn"),
            BlockPolicy::Error => write!(f, "error"),
        }
    }
}

/// Log categories, each mapped to a `tracing` target.
pub const DEBUG_CATEGORIES: [&str; 6] = ["init", "store", "object", "lock", "task", "resolve"];

/// Bridge settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Number of worker threads for asynchronous calls
    pub workers: usize,
    /// Behaviour of synchronous calls on busy objects
    pub block_policy: BlockPolicy,
    /// Log categories to enable at debug level
    pub debug: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            block_policy: BlockPolicy::Block,
            debug: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by the `HOSTBRIDGE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup("HOSTBRIDGE_WORKERS") {
            config.workers = match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidWorkers { value }),
            };
        }
        if let Some(value) = lookup("HOSTBRIDGE_BLOCK_POLICY") {
            config.block_policy = value.parse()?;
        }
        if let Some(value) = lookup("HOSTBRIDGE_DEBUG") {
            config.debug = parse_categories(&value)?;
        }
        Ok(config)
    }

    /// Set the worker count (at least one).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the block policy.
    pub fn with_block_policy(mut self, policy: BlockPolicy) -> Self {
        self.block_policy = policy;
        self
    }

    /// Enable debug logging for `category`.
    pub fn with_debug(mut self, category: &str) -> Result<Self, ConfigError> {
        self.debug.extend(parse_categories(category)?);
        Ok(self)
    }

    /// `EnvFilter` directives for the enabled categories.
    pub fn filter_directives(&self) -> String {
        self.debug
            .iter()
            .map(|category| format!("hostbridge::{category}=debug"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn parse_categories(value: &str) -> Result<Vec<String>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|category| {
            if DEBUG_CATEGORIES.contains(&category) {
                Ok(category.to_string())
            } else {
                Err(ConfigError::UnknownCategory {
                    value: category.to_string(),
                })
            }
        })
        .collect()
}
