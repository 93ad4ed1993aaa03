//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::TraceScopeConfig;
use crate::error::TraceError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the user config file and environment.
    pub fn load() -> Result<TraceScopeConfig, TraceError> {
        let config = MergeService::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<TraceScopeConfig, TraceError> {
        let config = MergeService::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Create default configuration.
    pub fn default() -> TraceScopeConfig {
        TraceScopeConfig::default()
    }
}
