//! Archive Backend
//!
//! Uniform read access to the entries of one trace, whether they live in a
//! zip archive (local or fetched over HTTP) or are served one by one by a
//! development server while a run is still writing them.

pub mod archive;
pub mod fetch;
pub mod memory;
pub mod progress;

use crate::error::TraceError;
use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;

pub use archive::ZipTraceBackend;
pub use fetch::FetchTraceBackend;
pub use memory::MemoryBackend;
pub use progress::ProgressTracker;

/// Byte-level progress: `(done, total)`
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Progress callback that discards every update.
pub fn no_progress() -> ProgressCallback {
    Arc::new(|_: u64, _: u64| {})
}

/// Read access to the named entries of one trace.
///
/// Lookups of absent entries return `Ok(None)` / `Ok(false)`; only transport
/// failures are errors.
#[async_trait]
pub trait TraceBackend: Send + Sync {
    /// All entry names, in archive order. Listed once and memoized.
    async fn entry_names(&self) -> Result<Vec<String>, TraceError>;

    async fn has_entry(&self, name: &str) -> Result<bool, TraceError>;

    async fn read_text(&self, name: &str) -> Result<Option<String>, TraceError>;

    async fn read_blob(&self, name: &str) -> Result<Option<Vec<u8>>, TraceError>;

    /// Whether the entries may still be appended to by a running execution.
    fn is_live(&self) -> bool;

    /// Locator the backend was opened with.
    fn trace_url(&self) -> &str;
}

/// Pick the backend for a locator: JSON listings come from a development
/// server, everything else is a zip archive.
pub fn backend_for_locator(locator: &str, progress: ProgressCallback) -> Arc<dyn TraceBackend> {
    if locator.ends_with("json") {
        Arc::new(FetchTraceBackend::new(locator))
    } else {
        Arc::new(ZipTraceBackend::new(locator, progress))
    }
}

/// Normalize a remote locator before fetching it.
///
/// Share links on www.dropbox.com do not serve raw bytes; the content host
/// does.
pub fn format_url(locator: &str) -> String {
    const DROPBOX_SHARE: &str = "https://www.dropbox.com/";
    const DROPBOX_CONTENT: &str = "https://dl.dropboxusercontent.com/";
    match locator.strip_prefix(DROPBOX_SHARE) {
        Some(rest) => format!("{}{}", DROPBOX_CONTENT, rest),
        None => locator.to_string(),
    }
}

/// Parse `locator` as an absolute http(s) URL.
pub(crate) fn remote_url(locator: &str) -> Option<Url> {
    Url::parse(locator)
        .ok()
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
}
