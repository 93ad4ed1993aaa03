//! Aggregated per-context model.

use crate::trace::snapshot::ResourceSnapshot;
use crate::trace::{
    ActionError, Attachment, BrowserContextOptions, ConsoleMessageEvent, ContextOrigin,
    ErrorEvent, EventTraceEvent, ScreencastFrame, StackFrame, StdioEvent,
};
use crate::types::{CallId, PageId, Point};
use serde_json::Value;

/// One timestamped message appended to an action.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub time: f64,
    pub message: String,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionEntry {
    pub call_id: CallId,
    pub start_time: f64,
    /// Zero until an `after` event (or finalization) closes the action
    pub end_time: f64,
    pub api_name: String,
    pub class: String,
    pub method: String,
    pub params: Value,
    pub wall_time: f64,
    pub before_snapshot: Option<String>,
    pub input_snapshot: Option<String>,
    pub after_snapshot: Option<String>,
    pub error: Option<ActionError>,
    pub result: Option<Value>,
    pub point: Option<Point>,
    pub page_id: Option<PageId>,
    pub parent_id: Option<CallId>,
    pub step_id: Option<String>,
    pub stack: Option<Vec<StackFrame>>,
    pub log: Vec<LogEntry>,
    pub attachments: Option<Vec<Attachment>>,
}

impl ActionEntry {
    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }
}

/// A page/tab and the screencast frames captured for it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageEntry {
    pub page_id: PageId,
    pub screencast_frames: Vec<ScreencastFrame>,
}

/// Entry of a context's merged event timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextEvent {
    Event(EventTraceEvent),
    Console(ConsoleMessageEvent),
}

impl ContextEvent {
    pub fn time(&self) -> f64 {
        match self {
            ContextEvent::Event(e) => e.time,
            ContextEvent::Console(e) => e.time,
        }
    }

    pub fn page_id(&self) -> Option<&str> {
        match self {
            ContextEvent::Event(e) => e.page_id.as_deref(),
            ContextEvent::Console(e) => e.page_id.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioStream {
    Stdout,
    Stderr,
}

/// Output captured from the test process.
#[derive(Debug, Clone, PartialEq)]
pub struct StdioEntry {
    pub stream: StdioStream,
    pub event: StdioEvent,
}

/// Everything captured for one browser execution context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEntry {
    /// Archive ordinal this context was read from
    pub id: String,
    pub origin: ContextOrigin,
    pub trace_url: String,
    /// Whether the archive carries source files
    pub has_source: bool,
    pub browser_name: String,
    pub channel: Option<String>,
    pub platform: Option<String>,
    pub title: Option<String>,
    pub sdk_language: Option<String>,
    pub test_id_attribute_name: Option<String>,
    pub wall_time: f64,
    /// Only ever lowered while folding
    pub start_time: f64,
    /// Only ever raised while folding
    pub end_time: f64,
    pub options: BrowserContextOptions,
    pub actions: Vec<ActionEntry>,
    pub events: Vec<ContextEvent>,
    pub stdio: Vec<StdioEntry>,
    pub errors: Vec<ErrorEvent>,
    pub pages: Vec<PageEntry>,
    pub resources: Vec<ResourceSnapshot>,
}

impl ContextEntry {
    pub fn new(id: impl Into<String>, trace_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            origin: ContextOrigin::Library,
            trace_url: trace_url.into(),
            has_source: false,
            browser_name: String::new(),
            channel: None,
            platform: None,
            title: None,
            sdk_language: None,
            test_id_attribute_name: None,
            wall_time: 0.0,
            start_time: f64::MAX,
            end_time: 0.0,
            options: BrowserContextOptions::default(),
            actions: Vec::new(),
            events: Vec::new(),
            stdio: Vec::new(),
            errors: Vec::new(),
            pages: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// Widen the time range to cover `time`.
    pub(crate) fn widen(&mut self, start: f64, end: f64) {
        self.start_time = self.start_time.min(start);
        self.end_time = self.end_time.max(end);
    }

    /// Whether any timed event was folded in.
    pub fn has_timing(&self) -> bool {
        self.start_time <= self.end_time
    }

    pub fn action(&self, call_id: &str) -> Option<&ActionEntry> {
        self.actions.iter().find(|a| a.call_id == call_id)
    }

    pub fn page(&self, page_id: &str) -> Option<&PageEntry> {
        self.pages.iter().find(|p| p.page_id == page_id)
    }
}
