//! Development-server backend.
//!
//! A running test session exposes a JSON listing of the files it has written so
//! far. Each file is then fetched individually through `file?path=<path>`,
//! resolved against the listing URL.

use super::{format_url, TraceBackend};
use crate::error::TraceError;
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default)]
    entries: Vec<ListingEntry>,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    name: String,
    path: String,
}

/// Trace whose entries are served one file at a time and may still grow.
pub struct FetchTraceBackend {
    trace_url: String,
    client: OnceCell<reqwest::Client>,
    entries: OnceCell<Vec<(String, String)>>,
}

impl FetchTraceBackend {
    pub fn new(trace_url: impl Into<String>) -> Self {
        Self {
            trace_url: trace_url.into(),
            client: OnceCell::new(),
            entries: OnceCell::new(),
        }
    }

    async fn client(&self) -> &reqwest::Client {
        self.client.get_or_init(|| async { reqwest::Client::new() }).await
    }

    /// Absolute URL for a listed path.
    pub fn file_url(&self, path: &str) -> Result<String, TraceError> {
        if path.starts_with("http") || path.starts_with("blob") {
            return Ok(format_url(path));
        }
        let base = Url::parse(&format_url(&self.trace_url))
            .map_err(|e| TraceError::Transport(format!("Invalid trace URL {}: {}", self.trace_url, e)))?;
        let mut url = base
            .join("file")
            .map_err(|e| TraceError::Transport(format!("Invalid trace URL {}: {}", self.trace_url, e)))?;
        url.query_pairs_mut().clear().append_pair("path", path);
        Ok(url.to_string())
    }

    async fn entries(&self) -> Result<&Vec<(String, String)>, TraceError> {
        self.entries
            .get_or_try_init(|| async {
                let url = format_url(&self.trace_url);
                debug!(url = %url, "Fetching live trace listing");
                let response = self.client().await.get(&url).send().await?;
                if !response.status().is_success() {
                    return Err(TraceError::Transport(format!(
                        "Could not load trace listing from {} ({})",
                        url,
                        response.status()
                    )));
                }
                let listing: Listing = response.json().await?;
                Ok(listing
                    .entries
                    .into_iter()
                    .map(|entry| (entry.name, entry.path))
                    .collect())
            })
            .await
    }

    async fn read_entry(&self, name: &str) -> Result<Option<reqwest::Response>, TraceError> {
        let path = match self.entries().await?.iter().find(|(n, _)| n == name) {
            Some((_, path)) => path.clone(),
            None => return Ok(None),
        };
        let url = self.file_url(&path)?;
        let response = self.client().await.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(TraceError::Transport(format!(
                "Could not read {} from {} ({})",
                name,
                url,
                response.status()
            )));
        }
        Ok(Some(response))
    }
}

#[async_trait]
impl TraceBackend for FetchTraceBackend {
    async fn entry_names(&self) -> Result<Vec<String>, TraceError> {
        Ok(self.entries().await?.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn has_entry(&self, name: &str) -> Result<bool, TraceError> {
        Ok(self.entries().await?.iter().any(|(n, _)| n == name))
    }

    async fn read_text(&self, name: &str) -> Result<Option<String>, TraceError> {
        match self.read_entry(name).await? {
            Some(response) => Ok(Some(response.text().await?)),
            None => Ok(None),
        }
    }

    async fn read_blob(&self, name: &str) -> Result<Option<Vec<u8>>, TraceError> {
        match self.read_entry(name).await? {
            Some(response) => Ok(Some(response.bytes().await?.to_vec())),
            None => Ok(None),
        }
    }

    fn is_live(&self) -> bool {
        true
    }

    fn trace_url(&self) -> &str {
        &self.trace_url
    }
}
