//! In-memory backend for embedding and tests.

use super::TraceBackend;
use crate::error::TraceError;
use async_trait::async_trait;

/// Entries held in memory, listed in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    trace_url: String,
    entries: Vec<(String, Vec<u8>)>,
    live: bool,
}

impl MemoryBackend {
    pub fn new(trace_url: impl Into<String>) -> Self {
        Self {
            trace_url: trace_url.into(),
            entries: Vec::new(),
            live: false,
        }
    }

    /// Mark the backend as still being written to.
    pub fn live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    /// Add or replace an entry.
    pub fn with_entry(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let name = name.into();
        let bytes = bytes.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = bytes,
            None => self.entries.push((name, bytes)),
        }
    }

    fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, bytes)| bytes.as_slice())
    }
}

#[async_trait]
impl TraceBackend for MemoryBackend {
    async fn entry_names(&self) -> Result<Vec<String>, TraceError> {
        Ok(self.entries.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn has_entry(&self, name: &str) -> Result<bool, TraceError> {
        Ok(self.get(name).is_some())
    }

    async fn read_text(&self, name: &str) -> Result<Option<String>, TraceError> {
        Ok(self
            .get(name)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
    }

    async fn read_blob(&self, name: &str) -> Result<Option<Vec<u8>>, TraceError> {
        Ok(self.get(name).map(<[u8]>::to_vec))
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn trace_url(&self) -> &str {
        &self.trace_url
    }
}
