//! Configuration
//!
//! Render cache budget, registry sweep cadence, progress weighting and logging,
//! merged from built-in defaults, an optional config file and `TRACESCOPE__*`
//! environment variables.

pub mod facade;
pub mod merge;
pub mod sources;

pub use facade::ConfigLoader;

use crate::cache::DEFAULT_RENDER_CACHE_BYTES;
use crate::error::TraceError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Allowed drift when checking that progress weights sum to one
const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Share of the combined progress value given to each load phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressWeights {
    #[serde(default = "default_transfer_weight")]
    pub transfer: f64,
    #[serde(default = "default_unpack_weight")]
    pub unpack: f64,
    /// Released only when loading completes
    #[serde(default = "default_reserved_weight")]
    pub reserved: f64,
}

fn default_transfer_weight() -> f64 {
    0.5
}

fn default_unpack_weight() -> f64 {
    0.4
}

fn default_reserved_weight() -> f64 {
    0.1
}

impl Default for ProgressWeights {
    fn default() -> Self {
        Self {
            transfer: default_transfer_weight(),
            unpack: default_unpack_weight(),
            reserved: default_reserved_weight(),
        }
    }
}

impl ProgressWeights {
    pub fn validate(&self) -> Result<(), TraceError> {
        for (name, weight) in [
            ("transfer", self.transfer),
            ("unpack", self.unpack),
            ("reserved", self.reserved),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(TraceError::ConfigError(format!(
                    "progress.{} must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }
        let sum = self.transfer + self.unpack + self.reserved;
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(TraceError::ConfigError(format!(
                "progress weights must sum to 1.0, got {}",
                sum
            )));
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceScopeConfig {
    /// Byte budget of each loaded trace's render cache
    #[serde(default = "default_render_cache_bytes")]
    pub render_cache_bytes: usize,

    /// Minimum time between two registry sweeps
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    #[serde(default)]
    pub progress: ProgressWeights,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_render_cache_bytes() -> usize {
    DEFAULT_RENDER_CACHE_BYTES
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

impl Default for TraceScopeConfig {
    fn default() -> Self {
        Self {
            render_cache_bytes: default_render_cache_bytes(),
            sweep_interval_ms: default_sweep_interval_ms(),
            progress: ProgressWeights::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TraceScopeConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Reject values that would make loading misbehave.
    pub fn validate(&self) -> Result<(), TraceError> {
        if self.render_cache_bytes == 0 {
            return Err(TraceError::ConfigError(
                "render_cache_bytes must be greater than zero".to_string(),
            ));
        }
        self.progress.validate()
    }
}
