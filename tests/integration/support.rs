//! Archive fixtures shared by the integration tests.

use serde_json::{json, Value};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracescope::backend::{TraceBackend, ZipTraceBackend};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Builds an in-memory zip archive entry by entry.
#[derive(Default)]
pub struct ArchiveBuilder {
    entries: Vec<(String, Vec<u8>)>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.push((name.to_string(), bytes.into()));
        self
    }

    /// Newline-delimited JSON log.
    pub fn log(self, name: &str, events: &[Value]) -> Self {
        let text = events
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        self.entry(name, text)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, bytes) in &self.entries {
            writer.start_file(name.as_str(), options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    pub fn write_to(&self, dir: &Path, file_name: &str) -> PathBuf {
        let path = dir.join(file_name);
        std::fs::write(&path, self.to_bytes()).unwrap();
        path
    }

    pub fn backend(&self, trace_url: &str) -> Arc<dyn TraceBackend> {
        Arc::new(ZipTraceBackend::from_bytes(trace_url, self.to_bytes()).unwrap())
    }
}

pub fn context_options(version: u32) -> Value {
    json!({
        "type": "context-options",
        "version": version,
        "origin": "library",
        "browserName": "chromium",
        "platform": "linux",
        "options": {"viewport": {"width": 1280, "height": 720}},
        "wallTime": 1000,
        "monotonicTime": 0
    })
}

pub fn before(call_id: &str, api_name: &str, start_time: f64, wall_time: f64) -> Value {
    json!({
        "type": "before",
        "callId": call_id,
        "apiName": api_name,
        "class": "Frame",
        "method": "goto",
        "params": {},
        "startTime": start_time,
        "wallTime": wall_time
    })
}

pub fn after(call_id: &str, end_time: f64) -> Value {
    json!({"type": "after", "callId": call_id, "endTime": end_time})
}

pub fn resource(url: &str, frame: &str, status: i64, sha1: Option<&str>, monotonic_time: f64) -> Value {
    let mut content = json!({"mimeType": "text/css; charset=utf-8"});
    if let Some(sha1) = sha1 {
        content["_sha1"] = json!(sha1);
    }
    json!({
        "type": "resource-snapshot",
        "snapshot": {
            "_frameref": frame,
            "request": {"url": url, "method": "GET", "headers": []},
            "response": {"status": status, "headers": [], "content": content},
            "_monotonicTime": monotonic_time
        }
    })
}

pub fn frame_snapshot(name: &str, timestamp: f64, html: Value) -> Value {
    json!({
        "type": "frame-snapshot",
        "snapshot": {
            "snapshotName": name,
            "callId": "call@1",
            "pageId": "page@1",
            "frameId": "frame@1",
            "frameUrl": "http://x/",
            "timestamp": timestamp,
            "doctype": "html",
            "html": html,
            "resourceOverrides": [],
            "viewport": {"width": 1280, "height": 720},
            "isMainFrame": true
        }
    })
}

/// Markup after the injected bootstrap script.
pub fn body(html: &str) -> &str {
    let end = html.find("</script>").unwrap() + "</script>".len();
    &html[end..]
}
