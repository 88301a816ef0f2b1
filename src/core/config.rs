//! Process configuration.
//!
//! Everything has a default, so an empty TOML file (or none at all) gives a
//! working server on port 5000 with eight workers.

use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 8;

/// Default upload limit (64 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Default limit on inflated gzip or bzip2 content (512 MiB).
pub const DEFAULT_MAX_DECOMPRESSED_BYTES: usize = 512 * 1024 * 1024;

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Worker pool settings.
    pub pool: PoolConfig,
    /// Feasibility solve settings.
    pub solver: SolverConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Path prefix for all routes (e.g. `/validator`).
    pub prefix: String,
    /// Maximum accepted request body.
    pub max_upload_bytes: usize,
    /// Maximum size of a compressed upload once inflated.
    pub max_decompressed_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            prefix: String::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_decompressed_bytes: DEFAULT_MAX_DECOMPRESSED_BYTES,
        }
    }
}

impl ServerConfig {
    /// The prefix with a leading slash and no trailing slash, or empty.
    pub fn normalized_prefix(&self) -> String {
        let trimmed = self.prefix.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Reject new jobs once this many are waiting. Unset means queue without limit.
    pub max_queued: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_queued: None,
        }
    }
}

impl PoolConfig {
    /// Set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the queue limit.
    pub fn with_max_queued(mut self, max_queued: usize) -> Self {
        self.max_queued = Some(max_queued);
        self
    }
}

/// Feasibility solve settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Objective values at or below this (but above zero) are reported as too low.
    pub low_flux_threshold: f64,
    /// Objective values closer than this to zero are treated as zero.
    pub zero_tolerance: f64,
    /// Interior-point iteration limit.
    pub max_iterations: u32,
    /// Wall-clock limit for one solve, in seconds. Unset means no limit.
    pub time_limit_secs: Option<f64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            low_flux_threshold: 1e-3,
            zero_tolerance: 1e-9,
            max_iterations: 200,
            time_limit_secs: None,
        }
    }
}

impl Config {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.workers == 0 {
            return Err(invalid("pool.workers", "must be at least 1"));
        }
        if !(self.solver.low_flux_threshold >= 0.0) {
            return Err(invalid("solver.low_flux_threshold", "must be non-negative"));
        }
        if !(self.solver.zero_tolerance >= 0.0) {
            return Err(invalid("solver.zero_tolerance", "must be non-negative"));
        }
        if let Some(limit) = self.solver.time_limit_secs {
            if !(limit > 0.0) {
                return Err(invalid("solver.time_limit_secs", "must be positive"));
            }
        }
        if self.server.max_upload_bytes == 0 {
            return Err(invalid("server.max_upload_bytes", "must be positive"));
        }
        if self.server.max_decompressed_bytes == 0 {
            return Err(invalid("server.max_decompressed_bytes", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
