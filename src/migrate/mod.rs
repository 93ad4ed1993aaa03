//! Version Migrator
//!
//! Rewrites raw event batches of any supported vintage into the latest schema.
//! Each transition `v -> v + 1` is a plain function over the batch; the table in
//! [`steps::STEPS`] is walked in order from the detected version up to
//! [`LATEST_VERSION`].

pub mod steps;

use crate::error::TraceError;
use crate::trace::LATEST_VERSION;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Version assumed for logs whose first event is not `context-options`
/// (test-runner side logs that predate versioned headers).
pub const HEADERLESS_VERSION: u32 = 6;

/// Console message recorded by an `object` event, resolved later by `console`.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConsoleObject {
    pub message_type: Value,
    pub text: Value,
    pub location: Value,
    pub args: Option<Vec<Value>>,
}

/// State threaded through the migration steps of one log.
#[derive(Debug, Default)]
pub struct MigrationContext {
    /// Viewport declared by the log's `context-options`, if any
    pub(crate) context_viewport: Option<Value>,
    /// JSHandle guid -> preview text
    pub(crate) js_handles: HashMap<String, String>,
    /// ConsoleMessage guid -> message payload
    pub(crate) console_objects: HashMap<String, ConsoleObject>,
    /// Whether a batch has already gone through the chain
    pub(crate) processed_first_batch: bool,
}

/// Per-context migrator.
///
/// One instance handles the `.trace` log of a context and then its `.network`
/// log; the version detected on the first event applies to every later line.
#[derive(Debug, Default)]
pub struct Migrator {
    version: Option<u32>,
    context: MigrationContext,
}

impl Migrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source version of the log, once detected.
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Parse and migrate every non-empty line of a log.
    pub fn migrate_log(&mut self, text: &str) -> Result<Vec<Value>, TraceError> {
        let mut events = Vec::new();
        for line in text.split('\n') {
            events.extend(self.migrate_line(line)?);
        }
        Ok(events)
    }

    /// Parse one line and migrate the resulting event.
    pub fn migrate_line(&mut self, line: &str) -> Result<Vec<Value>, TraceError> {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            return Ok(Vec::new());
        }
        let event = parse_line(line)?;
        self.migrate(event)
    }

    /// Run one event through every transition from the detected version.
    pub fn migrate(&mut self, event: Value) -> Result<Vec<Value>, TraceError> {
        let is_context = event_type(&event) == Some("context-options");
        if is_context {
            if let Some(viewport) = event.pointer("/options/viewport") {
                if !viewport.is_null() {
                    self.context.context_viewport = Some(viewport.clone());
                }
            }
        }

        let version = match self.version {
            Some(version) => version,
            None => {
                let detected = if is_context {
                    event
                        .get("version")
                        .and_then(Value::as_u64)
                        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
                        .unwrap_or(0)
                } else {
                    HEADERLESS_VERSION
                };
                if detected > LATEST_VERSION {
                    return Err(TraceError::UnsupportedVersion {
                        found: detected,
                        latest: LATEST_VERSION,
                    });
                }
                debug!(version = detected, "Detected trace schema version");
                self.version = Some(detected);
                detected
            }
        };

        let events = run_chain(&mut self.context, version, vec![event]);
        self.context.processed_first_batch = true;
        Ok(events)
    }
}

/// Apply the transitions `from -> LATEST_VERSION` to a batch.
pub fn run_chain(context: &mut MigrationContext, from: u32, mut events: Vec<Value>) -> Vec<Value> {
    for version in from..LATEST_VERSION {
        if let Some(step) = steps::STEPS.get(version as usize) {
            events = step(context, events);
        }
    }
    events
}

/// Parse one JSON line without a nesting limit.
///
/// Frame snapshots nest one array per DOM level, so deep pages exceed the
/// default parser depth. The stack grows on the heap as needed.
pub fn parse_line(line: &str) -> Result<Value, TraceError> {
    let mut deserializer = serde_json::Deserializer::from_str(line);
    deserializer.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
    deserializer.end()?;
    Ok(value)
}

pub(crate) fn event_type(event: &Value) -> Option<&str> {
    event.get("type").and_then(Value::as_str)
}
