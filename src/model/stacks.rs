//! Parser for the `.stacks` sidecar.

use crate::error::TraceError;
use crate::trace::StackFrame;
use crate::types::CallId;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Compact form: file names are interned and frames are positional tuples.
#[derive(Debug, Deserialize)]
struct CompactStacks {
    files: Vec<String>,
    stacks: Vec<(u64, Vec<(usize, u32, u32, Option<String>)>)>,
}

/// Parse a stacks sidecar into call id -> call-site frames.
pub fn parse_stacks(text: &str) -> Result<HashMap<CallId, Vec<StackFrame>>, TraceError> {
    let value: Value = serde_json::from_str(text)?;
    if value.get("files").is_some() && value.get("stacks").is_some() {
        let compact: CompactStacks = serde_json::from_value(value)?;
        return Ok(compact
            .stacks
            .into_iter()
            .map(|(id, frames)| {
                let frames = frames
                    .into_iter()
                    .map(|(file, line, column, function)| StackFrame {
                        file: compact.files.get(file).cloned().unwrap_or_default(),
                        line,
                        column,
                        function: function.filter(|f| !f.is_empty()),
                    })
                    .collect();
                (format!("call@{}", id), frames)
            })
            .collect());
    }
    Ok(serde_json::from_value(value)?)
}
