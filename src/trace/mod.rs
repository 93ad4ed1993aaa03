//! Trace Event Schema
//!
//! Typed form of the current (latest-version) trace event stream. Older
//! vintages are rewritten into this shape by [`crate::migrate`] before they are
//! decoded here.

pub mod snapshot;

use crate::types::{CallId, PageId, Point, Sha1, Viewport};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use snapshot::{FrameSnapshot, ResourceSnapshot};

/// Latest trace schema version understood by this crate
pub const LATEST_VERSION: u32 = 7;

/// Which side of a test run produced a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContextOrigin {
    #[default]
    Library,
    TestRunner,
}

/// Browser context options recorded with the trace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserContextOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_scale_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_mobile: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, rename = "baseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextCreatedEvent {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub origin: ContextOrigin,
    #[serde(default)]
    pub browser_name: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub wall_time: f64,
    #[serde(default)]
    pub monotonic_time: f64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sdk_language: Option<String>,
    #[serde(default)]
    pub options: BrowserContextOptions,
    #[serde(default)]
    pub test_id_attribute_name: Option<String>,
}

/// Low-fidelity screenshot of a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreencastFrame {
    pub page_id: PageId,
    pub sha1: Sha1,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_swap_wall_time: Option<f64>,
}

/// One frame of a call-site stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    pub file: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
    #[serde(default, rename = "function", skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// Structured error attached to an action. Bare strings written by older
/// recorders decode as the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ActionErrorRepr")]
pub struct ActionError {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ActionErrorRepr {
    Message(String),
    Structured {
        #[serde(default)]
        message: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        stack: Option<String>,
    },
}

impl From<ActionErrorRepr> for ActionError {
    fn from(repr: ActionErrorRepr) -> Self {
        match repr {
            ActionErrorRepr::Message(message) => ActionError {
                message,
                name: Some("Error".to_string()),
                stack: None,
            },
            ActionErrorRepr::Structured {
                message,
                name,
                stack,
            } => ActionError {
                message,
                name,
                stack,
            },
        }
    }
}

/// File attached to a finished action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<Sha1>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeforeActionEvent {
    pub call_id: CallId,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub api_name: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub wall_time: f64,
    #[serde(default)]
    pub before_snapshot: Option<String>,
    #[serde(default)]
    pub step_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<CallId>,
    #[serde(default)]
    pub page_id: Option<PageId>,
    #[serde(default)]
    pub stack: Option<Vec<StackFrame>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputActionEvent {
    pub call_id: CallId,
    #[serde(default)]
    pub input_snapshot: Option<String>,
    #[serde(default)]
    pub point: Option<Point>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub call_id: CallId,
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AfterActionEvent {
    pub call_id: CallId,
    #[serde(default)]
    pub end_time: f64,
    #[serde(default)]
    pub after_snapshot: Option<String>,
    #[serde(default)]
    pub error: Option<ActionError>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub point: Option<Point>,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
}

/// Monolithic action record written by older recorders
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEvent {
    pub call_id: CallId,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub end_time: f64,
    #[serde(default)]
    pub api_name: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub wall_time: f64,
    #[serde(default)]
    pub before_snapshot: Option<String>,
    #[serde(default)]
    pub input_snapshot: Option<String>,
    #[serde(default)]
    pub after_snapshot: Option<String>,
    #[serde(default)]
    pub error: Option<ActionError>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub point: Option<Point>,
    #[serde(default)]
    pub page_id: Option<PageId>,
    #[serde(default)]
    pub parent_id: Option<CallId>,
}

/// Generic protocol event (navigation, dialog, page error, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTraceEvent {
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<PageId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleArg {
    #[serde(default)]
    pub preview: String,
    /// Raw value of the argument; any JSON value
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleLocation {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub line_number: i64,
    #[serde(default)]
    pub column_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleMessageEvent {
    #[serde(default)]
    pub time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<PageId>,
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<ConsoleArg>>,
    #[serde(default)]
    pub location: ConsoleLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdioEvent {
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<StackFrame>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceSnapshotEvent {
    pub snapshot: ResourceSnapshot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameSnapshotEvent {
    pub snapshot: FrameSnapshot,
}

/// One event of the current schema, discriminated by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TraceEvent {
    ContextOptions(ContextCreatedEvent),
    ScreencastFrame(ScreencastFrame),
    Before(BeforeActionEvent),
    Input(InputActionEvent),
    Log(LogEvent),
    After(AfterActionEvent),
    Action(ActionEvent),
    Event(EventTraceEvent),
    Console(ConsoleMessageEvent),
    Stdout(StdioEvent),
    Stderr(StdioEvent),
    Error(ErrorEvent),
    ResourceSnapshot(ResourceSnapshotEvent),
    FrameSnapshot(FrameSnapshotEvent),
    #[serde(other)]
    Unknown,
}

impl TraceEvent {
    /// Page the event belongs to, when it names one.
    pub fn page_id(&self) -> Option<&str> {
        match self {
            TraceEvent::ScreencastFrame(e) => Some(e.page_id.as_str()),
            TraceEvent::Before(e) => e.page_id.as_deref(),
            TraceEvent::Action(e) => e.page_id.as_deref(),
            TraceEvent::Event(e) => e.page_id.as_deref(),
            TraceEvent::Console(e) => e.page_id.as_deref(),
            _ => None,
        }
        .filter(|id| !id.is_empty())
    }
}
