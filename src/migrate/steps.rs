//! Per-version transitions.
//!
//! `STEPS[v]` rewrites a batch from version `v` to `v + 1`. Steps may drop an
//! event, keep it, or expand it into several.

use super::{event_type, ConsoleObject, MigrationContext};
use crate::trace::LATEST_VERSION;
use serde_json::{json, Map, Value};

/// Signature shared by every transition.
pub type MigrationStep = fn(&mut MigrationContext, Vec<Value>) -> Vec<Value>;

/// Ordered transition table, indexed by source version.
pub const STEPS: [MigrationStep; LATEST_VERSION as usize] = [
    structure_errors,
    fix_main_frame_viewport,
    har_resources,
    split_actions,
    resolve_console_messages,
    extract_logs,
    context_header,
];

/// 0 -> 1: string errors become structured error objects.
pub fn structure_errors(_ctx: &mut MigrationContext, mut events: Vec<Value>) -> Vec<Value> {
    for event in events.iter_mut() {
        if event_type(event) != Some("action") {
            continue;
        }
        if let Some(metadata) = event.get_mut("metadata").and_then(Value::as_object_mut) {
            if let Some(Value::String(message)) = metadata.get("error") {
                let message = message.clone();
                metadata.insert(
                    "error".to_string(),
                    json!({ "error": { "name": "Error", "message": message } }),
                );
            }
        }
    }
    events
}

/// 1 -> 2: main-frame snapshots carried a bogus viewport.
pub fn fix_main_frame_viewport(ctx: &mut MigrationContext, mut events: Vec<Value>) -> Vec<Value> {
    let viewport = ctx
        .context_viewport
        .clone()
        .unwrap_or_else(|| json!({ "width": 1280, "height": 720 }));
    for event in events.iter_mut() {
        if event_type(event) != Some("frame-snapshot") {
            continue;
        }
        let Some(snapshot) = event.get_mut("snapshot").and_then(Value::as_object_mut) else {
            continue;
        };
        if snapshot.get("isMainFrame").and_then(Value::as_bool) == Some(true) {
            snapshot.insert("viewport".to_string(), viewport.clone());
        }
    }
    events
}

/// 2 -> 3: flat resource records become HAR-like entries.
pub fn har_resources(_ctx: &mut MigrationContext, mut events: Vec<Value>) -> Vec<Value> {
    for event in events.iter_mut() {
        if event_type(event) != Some("resource-snapshot") {
            continue;
        }
        let Some(old) = event.get("snapshot").and_then(Value::as_object) else {
            continue;
        };
        if old.contains_key("request") {
            continue;
        }
        let field = |name: &str| old.get(name).cloned().unwrap_or(Value::Null);

        let mut request = Map::new();
        request.insert("url".to_string(), field("url"));
        request.insert("method".to_string(), field("method"));
        request.insert("headers".to_string(), array_or_empty(field("requestHeaders")));
        if let Some(sha1) = old.get("requestSha1").filter(|v| is_truthy(v)) {
            request.insert("postData".to_string(), json!({ "_sha1": sha1 }));
        }

        let mut content = Map::new();
        content.insert("mimeType".to_string(), string_or_empty(field("contentType")));
        if let Some(sha1) = old.get("responseSha1").filter(|v| !v.is_null()) {
            content.insert("_sha1".to_string(), sha1.clone());
        }

        let mut snapshot = Map::new();
        if let Some(frame) = old.get("frameId").filter(|v| !v.is_null()) {
            snapshot.insert("_frameref".to_string(), frame.clone());
        }
        snapshot.insert("request".to_string(), Value::Object(request));
        snapshot.insert(
            "response".to_string(),
            json!({
                "status": field("status"),
                "headers": array_or_empty(field("responseHeaders")),
                "content": Value::Object(content),
            }),
        );
        if let Some(time) = old.get("timestamp").filter(|v| !v.is_null()) {
            snapshot.insert("_monotonicTime".to_string(), time.clone());
        }
        event["snapshot"] = Value::Object(snapshot);
    }
    events
}

/// 3 -> 4: metadata-wrapped records become the modern event family.
pub fn split_actions(_ctx: &mut MigrationContext, events: Vec<Value>) -> Vec<Value> {
    let mut result = Vec::with_capacity(events.len());
    for event in events {
        let kind = event_type(&event).map(str::to_string);
        match kind.as_deref() {
            Some("action") | Some("event") => {}
            _ => {
                result.push(event);
                continue;
            }
        }
        let Some(metadata) = event.get("metadata") else {
            continue;
        };
        let method = str_field(metadata, "method");
        if is_truthy(metadata.get("internal").unwrap_or(&Value::Null)) || method.starts_with("tracing") {
            continue;
        }
        let class = str_field(metadata, "type");

        if kind.as_deref() == Some("event") {
            if method == "__create__" && class == "ConsoleMessage" {
                result.push(json!({
                    "type": "object",
                    "class": class,
                    "guid": metadata.pointer("/params/guid").cloned().unwrap_or(Value::Null),
                    "initializer": metadata.pointer("/params/initializer").cloned().unwrap_or(Value::Null),
                }));
            } else {
                let mut modern = json!({
                    "type": "event",
                    "time": metadata.get("startTime").cloned().unwrap_or(json!(0)),
                    "class": class,
                    "method": method,
                    "params": metadata.get("params").cloned().unwrap_or(Value::Null),
                });
                copy_present(metadata, "pageId", &mut modern, "pageId");
                result.push(modern);
            }
            continue;
        }

        result.extend(split_action(metadata, &class, &method));
    }
    result
}

fn split_action(metadata: &Value, class: &str, method: &str) -> Vec<Value> {
    let call_id = metadata.get("id").cloned().unwrap_or(Value::Null);
    let snapshot_named = |title: &str| -> Option<Value> {
        metadata
            .get("snapshots")
            .and_then(Value::as_array)?
            .iter()
            .find(|s| s.get("title").and_then(Value::as_str) == Some(title))
            .and_then(|s| s.get("snapshotName"))
            .cloned()
    };
    let api_name = metadata
        .get("apiName")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}.{}", class, method));
    let wall_time = metadata
        .get("wallTime")
        .filter(|v| is_truthy(v))
        .cloned()
        .unwrap_or_else(|| json!(chrono::Utc::now().timestamp_millis()));

    let mut before = json!({
        "type": "before",
        "callId": call_id,
        "startTime": metadata.get("startTime").cloned().unwrap_or(json!(0)),
        "apiName": api_name,
        "class": class,
        "method": method,
        "params": metadata.get("params").cloned().unwrap_or(Value::Null),
        "wallTime": wall_time,
    });
    if let Some(name) = snapshot_named("before") {
        before["beforeSnapshot"] = name;
    }
    copy_present(metadata, "pageId", &mut before, "pageId");

    let mut events = vec![before];

    let input_snapshot = snapshot_named("input");
    let point = metadata.get("point").filter(|v| !v.is_null()).cloned();
    if input_snapshot.is_some() || point.is_some() {
        let mut input = json!({ "type": "input", "callId": call_id });
        if let Some(name) = input_snapshot {
            input["inputSnapshot"] = name;
        }
        if let Some(point) = &point {
            input["point"] = point.clone();
        }
        events.push(input);
    }

    let mut after = json!({
        "type": "after",
        "callId": call_id,
        "endTime": metadata.get("endTime").cloned().unwrap_or(json!(0)),
        "log": metadata.get("log").cloned().filter(Value::is_array).unwrap_or(json!([])),
    });
    if let Some(name) = snapshot_named("after") {
        after["afterSnapshot"] = name;
    }
    if let Some(error) = metadata.pointer("/error/error").filter(|v| !v.is_null()) {
        after["error"] = error.clone();
    }
    copy_present(metadata, "result", &mut after, "result");
    if let Some(point) = point {
        after["point"] = point;
    }
    events.push(after);
    events
}

/// 4 -> 5: console messages referenced handles through side tables.
pub fn resolve_console_messages(ctx: &mut MigrationContext, events: Vec<Value>) -> Vec<Value> {
    let mut result = Vec::with_capacity(events.len());
    for event in events {
        let kind = event_type(&event);
        let method = event.get("method").and_then(Value::as_str);
        let class = event.get("class").and_then(Value::as_str);

        if kind == Some("event") && method == Some("__create__") && class == Some("JSHandle") {
            if let Some(guid) = event.pointer("/params/guid").and_then(Value::as_str) {
                let preview = event
                    .pointer("/params/initializer/preview")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                ctx.js_handles.insert(guid.to_string(), preview.to_string());
            }
        }

        if kind == Some("object") {
            if class != Some("ConsoleMessage") {
                continue;
            }
            let initializer = event.get("initializer").cloned().unwrap_or(Value::Null);
            let args = initializer.get("args").and_then(Value::as_array).map(|args| {
                args.iter()
                    .map(|arg| match arg.get("guid").and_then(Value::as_str) {
                        Some(guid) => {
                            let preview = ctx
                                .js_handles
                                .get(guid)
                                .cloned()
                                .unwrap_or_else(|| "<object>".to_string());
                            json!({ "preview": preview, "value": "" })
                        }
                        None => json!({
                            "preview": string_or_empty(arg.get("preview").cloned().unwrap_or(Value::Null)),
                            "value": string_or_empty(arg.get("value").cloned().unwrap_or(Value::Null)),
                        }),
                    })
                    .collect()
            });
            if let Some(guid) = event.get("guid").and_then(Value::as_str) {
                ctx.console_objects.insert(
                    guid.to_string(),
                    ConsoleObject {
                        message_type: initializer.get("type").cloned().unwrap_or(Value::Null),
                        text: initializer.get("text").cloned().unwrap_or(Value::Null),
                        location: initializer.get("location").cloned().unwrap_or(Value::Null),
                        args,
                    },
                );
            }
            continue;
        }

        if kind == Some("event") && method == Some("console") {
            let guid = event
                .pointer("/params/message/guid")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let Some(message) = ctx.console_objects.get(guid) else {
                continue;
            };
            let mut console = json!({
                "type": "console",
                "time": event.get("time").cloned().unwrap_or(json!(0)),
                "messageType": string_or_empty(message.message_type.clone()),
                "text": string_or_empty(message.text.clone()),
                "location": if message.location.is_object() { message.location.clone() } else { json!({}) },
            });
            if let Some(args) = &message.args {
                console["args"] = Value::Array(args.clone());
            }
            copy_present(&event, "pageId", &mut console, "pageId");
            result.push(console);
            continue;
        }

        result.push(event);
    }
    result
}

/// 5 -> 6: inline per-action logs become standalone `log` events.
pub fn extract_logs(_ctx: &mut MigrationContext, events: Vec<Value>) -> Vec<Value> {
    let mut result = Vec::with_capacity(events.len());
    for mut event in events {
        let carries_log = matches!(event_type(&event), Some("after") | Some("action"));
        let log = if carries_log {
            event.as_object_mut().and_then(|map| map.remove("log"))
        } else {
            None
        };
        let call_id = event.get("callId").cloned().unwrap_or(Value::Null);
        result.push(event);
        if let Some(Value::Array(lines)) = log {
            for message in lines {
                result.push(json!({
                    "type": "log",
                    "callId": call_id,
                    "message": message,
                    "time": -1,
                }));
            }
        }
    }
    result
}

/// 6 -> 7: every log starts with a `context-options` header.
pub fn context_header(ctx: &mut MigrationContext, events: Vec<Value>) -> Vec<Value> {
    let mut result = Vec::with_capacity(events.len() + 1);
    let starts_with_header = events
        .first()
        .map(|e| event_type(e) == Some("context-options"))
        .unwrap_or(false);
    if !ctx.processed_first_batch && !starts_with_header {
        result.push(json!({
            "type": "context-options",
            "origin": "testRunner",
            "version": LATEST_VERSION,
            "browserName": "",
            "options": {},
            "platform": std::env::consts::OS,
            "wallTime": 0,
            "monotonicTime": 0,
            "sdkLanguage": "javascript",
        }));
    }
    for mut event in events {
        if event_type(&event) == Some("context-options") {
            if let Some(map) = event.as_object_mut() {
                map.insert("monotonicTime".to_string(), json!(0));
                map.insert("origin".to_string(), json!("library"));
                map.insert("version".to_string(), json!(LATEST_VERSION));
            }
        }
        result.push(event);
    }
    result
}

fn str_field(value: &Value, name: &str) -> String {
    value
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn copy_present(from: &Value, from_key: &str, to: &mut Value, to_key: &str) {
    if let Some(value) = from.get(from_key).filter(|v| !v.is_null()) {
        to[to_key] = value.clone();
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn array_or_empty(value: Value) -> Value {
    if value.is_array() {
        value
    } else {
        json!([])
    }
}

fn string_or_empty(value: Value) -> Value {
    if value.is_string() {
        value
    } else {
        json!("")
    }
}
