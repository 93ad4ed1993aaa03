//! Trace Model
//!
//! Loads every execution context of a trace archive into memory: each
//! ordinal's `.trace` and `.network` logs are migrated to the latest schema and
//! folded into a [`ContextEntry`], while snapshots and resources land in a
//! shared [`SnapshotStorage`].

mod builder;
pub mod entries;
pub mod multi;
pub mod stacks;

pub use entries::{
    ActionEntry, ContextEntry, ContextEvent, LogEntry, PageEntry, StdioEntry, StdioStream,
};
pub use multi::{ErrorDescriptor, MultiTraceModel};
pub use stacks::parse_stacks;

use crate::backend::{ProgressCallback, TraceBackend};
use crate::cache::DEFAULT_RENDER_CACHE_BYTES;
use crate::error::TraceError;
use crate::migrate::Migrator;
use crate::snapshot::SnapshotStorage;
use crate::trace::Attachment;
use crate::types::Sha1;
use builder::ContextBuilder;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Content type recorded for payloads whose type is deliberately unknown
pub const UNKNOWN_CONTENT_TYPE: &str = "x-unknown";

/// Content type for payloads with no recorded type
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Binary payload with its content type reattached.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    /// `None` for untyped payloads
    pub content_type: Option<String>,
}

/// Fully loaded trace.
pub struct TraceModel {
    pub context_entries: Vec<ContextEntry>,
    backend: Arc<dyn TraceBackend>,
    storage: SnapshotStorage,
    content_types: HashMap<Sha1, String>,
    attachments: HashMap<Sha1, Attachment>,
}

impl std::fmt::Debug for TraceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceModel")
            .field("trace_url", &self.backend.trace_url())
            .field("contexts", &self.context_entries.len())
            .finish()
    }
}

impl TraceModel {
    /// Load with the default render cache budget.
    pub async fn load(
        backend: Arc<dyn TraceBackend>,
        progress: ProgressCallback,
    ) -> Result<Self, TraceError> {
        Self::load_with_cache(backend, progress, DEFAULT_RENDER_CACHE_BYTES).await
    }

    /// Load every context of the archive.
    ///
    /// `progress` receives `(done, 3 * ordinals)`: one step after each of the
    /// `.trace`, `.network` and `.stacks` reads of every ordinal.
    pub async fn load_with_cache(
        backend: Arc<dyn TraceBackend>,
        progress: ProgressCallback,
        cache_bytes: usize,
    ) -> Result<Self, TraceError> {
        let entry_names = backend.entry_names().await?;
        let ordinals = ordinals(&entry_names);
        let has_source = entry_names.iter().any(|name| name.contains("src@"));
        if ordinals.is_empty() {
            if backend.has_entry("index.html").await? {
                return Err(TraceError::ReportNotTrace);
            }
            return Err(TraceError::MissingTrace);
        }
        info!(
            trace = %backend.trace_url(),
            entries = entry_names.len(),
            contexts = ordinals.len(),
            "Loading trace"
        );

        let mut storage = SnapshotStorage::new(cache_bytes);
        let mut attachments = HashMap::new();
        let mut context_entries = Vec::with_capacity(ordinals.len());
        let total = ordinals.len() as u64 * 3;
        let mut done = 0;

        for ordinal in &ordinals {
            let mut context = ContextEntry::new(ordinal.clone(), backend.trace_url());
            context.has_source = has_source;
            let mut migrator = Migrator::new();
            let mut builder = ContextBuilder::new(context, &mut storage, &mut attachments);

            for suffix in ["trace", "network"] {
                let name = format!("{}.{}", ordinal, suffix);
                let text = backend.read_text(&name).await?.unwrap_or_default();
                for event in migrator.migrate_log(&text)? {
                    builder.fold_value(event);
                }
                done += 1;
                progress(done, total);
            }

            let stacks = match backend.read_text(&format!("{}.stacks", ordinal)).await? {
                Some(text) if !text.trim().is_empty() => Some(parse_stacks(&text)?),
                _ => None,
            };
            context = builder.finish(backend.is_live(), stacks.as_ref());
            done += 1;
            progress(done, total);

            debug!(
                ordinal = %ordinal,
                version = ?migrator.version(),
                actions = context.actions.len(),
                "Loaded context"
            );
            context_entries.push(context);
        }

        storage.finalize();

        let mut content_types = HashMap::new();
        for resource in context_entries.iter().flat_map(|c| c.resources.iter()) {
            if let Some(post_data) = &resource.request.post_data {
                if let Some(sha1) = &post_data.sha1 {
                    content_types.insert(sha1.clone(), strip_encoding(&post_data.mime_type));
                }
            }
            let content = &resource.response.content;
            if let Some(sha1) = &content.sha1 {
                content_types.insert(sha1.clone(), strip_encoding(&content.mime_type));
            }
        }

        Ok(Self {
            context_entries,
            backend,
            storage,
            content_types,
            attachments,
        })
    }

    pub fn trace_url(&self) -> &str {
        self.backend.trace_url()
    }

    pub fn storage(&self) -> &SnapshotStorage {
        &self.storage
    }

    pub async fn has_entry(&self, name: &str) -> Result<bool, TraceError> {
        self.backend.has_entry(name).await
    }

    /// Content type recorded for a payload hash, if any.
    pub fn content_type(&self, sha1: &str) -> Option<&str> {
        self.content_types.get(sha1).map(String::as_str)
    }

    /// Read `resources/<sha1>` and reattach its recorded content type.
    pub async fn resource_for_sha1(&self, sha1: &str) -> Result<Option<Blob>, TraceError> {
        let Some(bytes) = self.backend.read_blob(&format!("resources/{}", sha1)).await? else {
            return Ok(None);
        };
        let content_type = match self.content_type(sha1) {
            Some(UNKNOWN_CONTENT_TYPE) => None,
            Some(content_type) if !content_type.is_empty() => Some(content_type.to_string()),
            _ => Some(DEFAULT_CONTENT_TYPE.to_string()),
        };
        Ok(Some(Blob {
            bytes,
            content_type,
        }))
    }

    pub fn attachment_for_sha1(&self, sha1: &str) -> Option<&Attachment> {
        self.attachments.get(sha1)
    }

    /// Merged view over all contexts.
    pub fn multi_trace(&self) -> MultiTraceModel {
        MultiTraceModel::new(self.context_entries.clone())
    }
}

/// Context ordinals: the stems of every `<ordinal>.trace` entry.
fn ordinals(entry_names: &[String]) -> Vec<String> {
    let mut ordinals: Vec<String> = Vec::new();
    for name in entry_names {
        if let Some(stem) = name.strip_suffix(".trace") {
            if !stem.is_empty() && !ordinals.iter().any(|o| o == stem) {
                ordinals.push(stem.to_string());
            }
        }
    }
    ordinals
}

/// Drop a `; charset=...` suffix from a mime type.
pub fn strip_encoding(content_type: &str) -> String {
    static CHARSET: OnceLock<Regex> = OnceLock::new();
    let charset = CHARSET.get_or_init(|| Regex::new(r"^(.*);\s*charset=.*$").expect("valid charset regex"));
    match charset.captures(content_type) {
        Some(captures) => captures[1].to_string(),
        None => content_type.to_string(),
    }
}
