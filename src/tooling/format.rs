//! Format loaded traces as text for the command line.

use crate::model::{MultiTraceModel, TraceModel};
use crate::snapshot::SnapshotStorage;
use chrono::{DateTime, Utc};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

/// Format a section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn format_wall_time(millis: f64) -> String {
    if millis <= 0.0 {
        return "-".to_string();
    }
    DateTime::<Utc>::from_timestamp_millis(millis as i64)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string())
}

fn format_duration(millis: f64) -> String {
    if millis <= 0.0 || !millis.is_finite() {
        return "-".to_string();
    }
    if millis < 1000.0 {
        format!("{:.0}ms", millis)
    } else {
        format!("{:.2}s", millis / 1000.0)
    }
}

/// Summary of every context plus the merged error list.
pub fn format_trace_info(model: &TraceModel, merged: &MultiTraceModel) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Trace")));
    out.push_str(&format!("  Location: {}\n", model.trace_url()));
    if !merged.browser_name.is_empty() {
        out.push_str(&format!("  Browser: {}\n", merged.browser_name));
    }
    if !merged.platform.is_empty() {
        out.push_str(&format!("  Platform: {}\n", merged.platform));
    }
    if !merged.title.is_empty() {
        out.push_str(&format!("  Title: {}\n", merged.title));
    }
    out.push_str(&format!(
        "  Started: {}\n",
        format_wall_time(merged.wall_time.unwrap_or(0.0))
    ));
    out.push_str(&format!(
        "  Duration: {}\n\n",
        format_duration(merged.end_time - merged.start_time)
    ));

    out.push_str(&format!("{}\n\n", format_section_heading("Contexts")));
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Ordinal", "Origin", "Browser", "Actions", "Pages", "Resources", "Duration"]);
    for context in &model.context_entries {
        let duration = if context.has_timing() {
            format_duration(context.end_time - context.start_time)
        } else {
            "-".to_string()
        };
        table.add_row(vec![
            context.id.clone(),
            format!("{:?}", context.origin),
            context.browser_name.clone(),
            context.actions.len().to_string(),
            context.pages.len().to_string(),
            context.resources.len().to_string(),
            duration,
        ]);
    }
    out.push_str(&format!("{}\n\n", table));

    if !merged.error_descriptors.is_empty() {
        out.push_str(&format!("{}\n\n", format_section_heading("Errors")));
        for error in &merged.error_descriptors {
            let location = error
                .stack
                .as_ref()
                .and_then(|stack| stack.first())
                .map(|frame| format!(" ({}:{}:{})", frame.file, frame.line, frame.column))
                .unwrap_or_default();
            out.push_str(&format!("  {}{}\n", error.message.red(), location));
        }
        out.push('\n');
    }
    out
}

/// Merged action list on the library clock.
pub fn format_actions(merged: &MultiTraceModel) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Call", "API", "Start", "Duration", "Snapshots", "Status"]);
    for action in &merged.actions {
        let snapshots = [&action.before_snapshot, &action.input_snapshot, &action.after_snapshot]
            .iter()
            .filter(|s| s.is_some())
            .count();
        let status = match &action.error {
            Some(error) => format!("{}", error.message.red()),
            None if action.end_time == 0.0 => "running".to_string(),
            None => format!("{}", "ok".green()),
        };
        table.add_row(vec![
            action.call_id.clone(),
            action.api_name.clone(),
            format!("{:.0}", action.start_time - merged.start_time),
            format_duration(action.duration()),
            snapshots.to_string(),
            status,
        ]);
    }
    format!("{}\n", table)
}

/// Every frame (and main-frame page alias) with its snapshots.
pub fn format_snapshots(storage: &SnapshotStorage) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Page/Frame", "#", "Snapshot", "Call", "Timestamp", "URL"]);
    for id in storage.frame_ids() {
        for renderer in storage.renderers(&id) {
            let snapshot = renderer.snapshot();
            table.add_row(vec![
                id.clone(),
                renderer.index().to_string(),
                snapshot.snapshot_name.clone().unwrap_or_else(|| "-".to_string()),
                snapshot.call_id.clone(),
                format!("{:.0}", snapshot.timestamp),
                snapshot.frame_url.clone(),
            ]);
        }
    }
    format!("{}\n", table)
}
