//! MergeService: orchestrates sources, applies merge policy, deserializes to TraceScopeConfig.

use crate::config::sources::{environment, user_file};
use crate::config::TraceScopeConfig;
use crate::error::TraceError;
use config::File;
use std::path::Path;

use super::merge_policy;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config from standard sources.
    /// Precedence: defaults (lowest) -> user config file -> environment (highest).
    pub fn load() -> Result<TraceScopeConfig, TraceError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = user_file::add_to_builder(builder)?;
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load config from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<TraceScopeConfig, TraceError> {
        if !path.exists() {
            return Err(TraceError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let builder = merge_policy::builder_with_defaults()?;
        let builder = builder.add_source(File::from(path));
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}
