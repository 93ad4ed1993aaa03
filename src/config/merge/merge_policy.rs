//! Built-in defaults, the lowest-precedence layer of every load.

use crate::config::TraceScopeConfig;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};

/// Start a builder seeded with the serialized default configuration.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = TraceScopeConfig::default();
    config::Config::builder()
        .set_default("render_cache_bytes", defaults.render_cache_bytes as i64)?
        .set_default("sweep_interval_ms", defaults.sweep_interval_ms as i64)?
        .set_default("progress.transfer", defaults.progress.transfer)?
        .set_default("progress.unpack", defaults.progress.unpack)?
        .set_default("progress.reserved", defaults.progress.reserved)
}
