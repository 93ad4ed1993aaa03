//! CLI Tooling
//!
//! Command-line access to the read-only query surface: load a trace, list its
//! contexts, actions and snapshots, render a snapshot, extract a resource.

use crate::backend::{backend_for_locator, ProgressTracker};
use crate::config::{ConfigLoader, TraceScopeConfig};
use crate::error::TraceError;
use crate::model::TraceModel;
use crate::tooling::format::{format_actions, format_snapshots, format_trace_info};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Tracescope - inspect recorded browser traces
#[derive(Parser)]
#[command(name = "tracescope")]
#[command(about = "Inspect recorded browser traces and reconstruct their DOM snapshots")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long, global = true)]
    pub log_output: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Summarize the contexts and errors of a trace
    Info {
        /// Trace archive path or URL
        trace: String,
    },
    /// List actions across all contexts
    Actions {
        trace: String,
    },
    /// List every captured snapshot by page/frame
    Snapshots {
        trace: String,
    },
    /// Render one snapshot to HTML
    Render {
        trace: String,
        /// Page id or frame id owning the snapshot
        target: String,
        /// Snapshot name, e.g. before@call@12
        name: String,
        /// Write the document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extract a captured resource by content hash
    Resource {
        trace: String,
        sha1: String,
        /// Write the payload here instead of printing a summary
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    fn trace(&self) -> &str {
        match self {
            Commands::Info { trace }
            | Commands::Actions { trace }
            | Commands::Snapshots { trace }
            | Commands::Render { trace, .. }
            | Commands::Resource { trace, .. } => trace,
        }
    }
}

/// CLI context holding resolved configuration
pub struct CliContext {
    config: TraceScopeConfig,
}

impl CliContext {
    /// Create a new CLI context, applying command-line logging overrides.
    pub fn new(cli: &Cli) -> Result<Self, TraceError> {
        let mut config = match &cli.config {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        if let Some(level) = &cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            config.logging.format = format.clone();
        }
        if let Some(output) = &cli.log_output {
            config.logging.output = output.clone();
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &TraceScopeConfig {
        &self.config
    }

    /// Load the trace named by `command` and run it.
    pub async fn execute(&self, command: &Commands) -> Result<String, TraceError> {
        let model = self.load(command.trace()).await?;
        match command {
            Commands::Info { .. } => Ok(format_trace_info(&model, &model.multi_trace())),
            Commands::Actions { .. } => Ok(format_actions(&model.multi_trace())),
            Commands::Snapshots { .. } => Ok(format_snapshots(model.storage())),
            Commands::Render {
                target,
                name,
                output,
                ..
            } => {
                let renderer = model.storage().snapshot_by_name(target, name).ok_or_else(|| {
                    TraceError::Transport(format!("No snapshot {} for {}", name, target))
                })?;
                let rendered = renderer.render();
                match output {
                    Some(path) => {
                        tokio::fs::write(path, rendered.html.as_bytes()).await?;
                        Ok(format!("Wrote {} bytes to {}", rendered.html.len(), path.display()))
                    }
                    None => Ok(rendered.html.to_string()),
                }
            }
            Commands::Resource { sha1, output, .. } => {
                let blob = model
                    .resource_for_sha1(sha1)
                    .await?
                    .ok_or_else(|| TraceError::Transport(format!("No resource {} in trace", sha1)))?;
                let content_type = blob.content_type.as_deref().unwrap_or("(untyped)");
                match output {
                    Some(path) => {
                        tokio::fs::write(path, &blob.bytes).await?;
                        Ok(format!(
                            "Wrote {} bytes ({}) to {}",
                            blob.bytes.len(),
                            content_type,
                            path.display()
                        ))
                    }
                    None => Ok(format!("{}: {} bytes, {}", sha1, blob.bytes.len(), content_type)),
                }
            }
        }
    }

    async fn load(&self, locator: &str) -> Result<TraceModel, TraceError> {
        let tracker = ProgressTracker::new(
            self.config.progress,
            Arc::new(|value: f64| debug!(progress = value, "Load progress")),
        );
        let backend = backend_for_locator(locator, tracker.transfer_callback());
        let model = TraceModel::load_with_cache(
            backend,
            tracker.unpack_callback(),
            self.config.render_cache_bytes,
        )
        .await?;
        tracker.complete();
        info!(trace = %locator, contexts = model.context_entries.len(), "Trace loaded");
        Ok(model)
    }
}
