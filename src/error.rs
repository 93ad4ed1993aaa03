//! Error types for trace ingestion and rendering.

use thiserror::Error;

/// Errors surfaced while loading a trace or configuring the viewer.
///
/// Rendering anomalies and corrupted-but-tolerated events never show up here:
/// they degrade to empty output or are skipped with a log line.
#[derive(Debug, Error)]
pub enum TraceError {
    /// The trace declares a schema newer than this build understands.
    #[error("The trace was created by a newer version of the recorder (version {found}, latest supported {latest}) and is not supported by this viewer. Please use the latest viewer to open the trace.")]
    UnsupportedVersion { found: u32, latest: u32 },

    /// No `.trace` entry in the archive.
    #[error("Cannot find .trace file")]
    MissingTrace,

    /// The archive is an HTML report bundle, not a trace.
    #[error("Could not load trace: this looks like an HTML report rather than a trace archive. Open index.html instead.")]
    ReportNotTrace,

    /// The archive could not be reached or read.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed trace data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl TraceError {
    /// Whether the failure came from reaching or unpacking the archive.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            TraceError::Transport(_) | TraceError::Http(_) | TraceError::Archive(_) | TraceError::Io(_)
        )
    }
}

impl From<config::ConfigError> for TraceError {
    fn from(err: config::ConfigError) -> Self {
        TraceError::ConfigError(err.to_string())
    }
}
