//! Zip archive backend.
//!
//! The archive is fetched once (streamed over HTTP, or read from disk) and then
//! opened for random access to its entries.

use super::{format_url, remote_url, ProgressCallback, TraceBackend};
use crate::error::TraceError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use zip::result::ZipError;
use zip::ZipArchive;

struct OpenArchive {
    names: Vec<String>,
    archive: Mutex<ZipArchive<Cursor<Vec<u8>>>>,
}

impl OpenArchive {
    fn open(bytes: Vec<u8>) -> Result<Self, TraceError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut names = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index)?;
            if !entry.is_dir() {
                names.push(entry.name().to_string());
            }
        }
        Ok(Self {
            names,
            archive: Mutex::new(archive),
        })
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, TraceError> {
        let mut archive = self.archive.lock();
        let mut entry = match archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }
}

/// Trace stored as a finalized zip archive.
///
/// A remote archive is downloaded whole before any entry is read; HTTP range
/// requests are not used, so opening a large trace costs its full transfer.
/// Local paths are read from disk in one go.
pub struct ZipTraceBackend {
    trace_url: String,
    progress: ProgressCallback,
    archive: OnceCell<OpenArchive>,
}

impl ZipTraceBackend {
    /// Backend for an http(s) URL, a `file://` URL or a filesystem path.
    /// Nothing is fetched until the first entry access.
    pub fn new(trace_url: impl Into<String>, progress: ProgressCallback) -> Self {
        Self {
            trace_url: trace_url.into(),
            progress,
            archive: OnceCell::new(),
        }
    }

    /// Backend over archive bytes already in memory.
    pub fn from_bytes(trace_url: impl Into<String>, bytes: Vec<u8>) -> Result<Self, TraceError> {
        let archive = OpenArchive::open(bytes)?;
        Ok(Self {
            trace_url: trace_url.into(),
            progress: super::no_progress(),
            archive: OnceCell::from(archive),
        })
    }

    async fn archive(&self) -> Result<&OpenArchive, TraceError> {
        self.archive
            .get_or_try_init(|| async {
                let bytes = self.fetch().await?;
                let archive = OpenArchive::open(bytes)?;
                info!(url = %self.trace_url, entries = archive.names.len(), "Opened trace archive");
                Ok(archive)
            })
            .await
    }

    async fn fetch(&self) -> Result<Vec<u8>, TraceError> {
        if let Some(url) = remote_url(&self.trace_url) {
            return self.download(url.as_str()).await;
        }
        let path = match reqwest::Url::parse(&self.trace_url) {
            Ok(url) if url.scheme() == "file" => url.to_file_path().map_err(|_| {
                TraceError::Transport(format!("Invalid file URL: {}", self.trace_url))
            })?,
            _ => PathBuf::from(&self.trace_url),
        };
        debug!(path = %path.display(), "Reading trace archive from disk");
        let bytes = tokio::fs::read(&path).await?;
        let size = bytes.len() as u64;
        (self.progress)(size, size);
        Ok(bytes)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, TraceError> {
        let url = format_url(url);
        debug!(url = %url, "Downloading trace archive");
        let mut response = reqwest::get(&url).await?;
        if !response.status().is_success() {
            return Err(TraceError::Transport(format!(
                "Could not load trace from {}. Make sure a valid trace is accessible over this url ({}).",
                url,
                response.status()
            )));
        }
        let total = response.content_length().unwrap_or(0);
        let mut bytes = Vec::with_capacity(usize::try_from(total).unwrap_or(0));
        while let Some(chunk) = response.chunk().await? {
            bytes.extend_from_slice(&chunk);
            let done = bytes.len() as u64;
            (self.progress)(done, total.max(done));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl TraceBackend for ZipTraceBackend {
    async fn entry_names(&self) -> Result<Vec<String>, TraceError> {
        Ok(self.archive().await?.names.clone())
    }

    async fn has_entry(&self, name: &str) -> Result<bool, TraceError> {
        Ok(self.archive().await?.names.iter().any(|n| n == name))
    }

    async fn read_text(&self, name: &str) -> Result<Option<String>, TraceError> {
        let bytes = self.archive().await?.read(name)?;
        Ok(bytes.map(|b| String::from_utf8_lossy(&b).into_owned()))
    }

    async fn read_blob(&self, name: &str) -> Result<Option<Vec<u8>>, TraceError> {
        self.archive().await?.read(name)
    }

    fn is_live(&self) -> bool {
        false
    }

    fn trace_url(&self) -> &str {
        &self.trace_url
    }
}
