//! Tunables for a sync run, loaded from TOML.
//!
//! ```toml
//! batch_size = 10000
//! cleanup_iteration_size = 100
//! max_workers = 4
//! statement_cache_size = 256
//!
//! [retry]
//! max_attempts = 5
//! base_delay_ms = 1000
//! ```
//!
//! Every key is optional; a missing file yields [`SyncConfig::default`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::RetryPolicy;

/// Records per upsert batch unless overridden.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;
/// Entities deleted per cleanup iteration unless overridden.
pub const DEFAULT_CLEANUP_ITERATION_SIZE: u64 = 100;

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Records sent per upsert statement.
    pub batch_size: usize,
    /// `LIMIT_SIZE` used by cleanup statements.
    pub cleanup_iteration_size: u64,
    /// Worker threads used by the sync runner.
    pub max_workers: usize,
    /// Compiled statements kept by the engine.
    pub statement_cache_size: usize,
    /// Retry policy applied when the engine wraps a session.
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            cleanup_iteration_size: DEFAULT_CLEANUP_ITERATION_SIZE,
            max_workers: 4,
            statement_cache_size: 256,
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Loads `explicit`, or the default location when `None`.
    ///
    /// A file that does not exist yields the defaults; a file that exists
    /// but cannot be read or parsed is an error.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        match explicit.or_else(default_config_path) {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Reads and validates a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SyncConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would stall or misbehave at run time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str| ConfigError::Invalid {
            field,
            reason: "must be greater than zero",
        };
        if self.batch_size == 0 {
            return Err(invalid("batch_size"));
        }
        if self.cleanup_iteration_size == 0 {
            return Err(invalid("cleanup_iteration_size"));
        }
        if self.max_workers == 0 {
            return Err(invalid("max_workers"));
        }
        if self.statement_cache_size == 0 {
            return Err(invalid("statement_cache_size"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts"));
        }
        Ok(())
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`SyncConfig`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("config value '{field}' {reason}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// `<config dir>/graphsync/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("graphsync").join("config.toml"))
}
