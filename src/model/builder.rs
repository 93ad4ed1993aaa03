//! Context Builder
//!
//! Folds migrated events, one at a time, into a [`ContextEntry`]. Frame and
//! resource snapshots are forwarded to [`SnapshotStorage`] as they arrive.

use super::entries::{
    ActionEntry, ContextEntry, ContextEvent, LogEntry, PageEntry, StdioEntry, StdioStream,
};
use crate::snapshot::SnapshotStorage;
use crate::trace::snapshot::DomTree;
use crate::trace::{Attachment, StackFrame, TraceEvent};
use crate::types::{CallId, Sha1};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

pub(crate) struct ContextBuilder<'a> {
    context: ContextEntry,
    actions: Vec<ActionEntry>,
    action_index: HashMap<CallId, usize>,
    storage: &'a mut SnapshotStorage,
    attachments: &'a mut HashMap<Sha1, Attachment>,
}

impl<'a> ContextBuilder<'a> {
    pub(crate) fn new(
        context: ContextEntry,
        storage: &'a mut SnapshotStorage,
        attachments: &'a mut HashMap<Sha1, Attachment>,
    ) -> Self {
        Self {
            context,
            actions: Vec::new(),
            action_index: HashMap::new(),
            storage,
            attachments,
        }
    }

    /// Decode and fold one migrated event. Undecodable events are skipped.
    pub(crate) fn fold_value(&mut self, mut value: Value) {
        // DOM trees nest one level per element; flatten them from the raw value
        // rather than through the recursive typed decoder.
        let is_frame_snapshot = value.get("type").and_then(Value::as_str) == Some("frame-snapshot");
        let html = if is_frame_snapshot {
            value.pointer_mut("/snapshot/html").map(Value::take)
        } else {
            None
        };
        match serde_json::from_value::<TraceEvent>(value) {
            Ok(TraceEvent::FrameSnapshot(mut event)) => {
                if let Some(html) = html {
                    event.snapshot.html = DomTree::from(&html);
                }
                self.fold(TraceEvent::FrameSnapshot(event))
            }
            Ok(event) => self.fold(event),
            Err(e) => warn!(context = %self.context.id, error = %e, "Skipping malformed trace event"),
        }
    }

    pub(crate) fn fold(&mut self, event: TraceEvent) {
        if let Some(page_id) = event.page_id() {
            let page_id = page_id.to_string();
            self.page_entry(&page_id);
        }

        match event {
            TraceEvent::ContextOptions(options) => {
                let context = &mut self.context;
                context.origin = options.origin;
                context.browser_name = options.browser_name;
                context.channel = options.channel;
                context.title = options.title;
                context.platform = options.platform;
                context.wall_time = options.wall_time;
                context.sdk_language = options.sdk_language;
                context.options = options.options;
                context.test_id_attribute_name = options.test_id_attribute_name;
                if options.monotonic_time != 0.0 {
                    context.start_time = context.start_time.min(options.monotonic_time);
                }
            }
            TraceEvent::ScreencastFrame(frame) => {
                self.context.widen(frame.timestamp, frame.timestamp);
                self.storage.add_screencast_frame(frame.clone());
                self.page_entry(&frame.page_id).screencast_frames.push(frame);
            }
            TraceEvent::Before(before) => {
                self.context.widen(before.start_time, 0.0);
                if self.context.wall_time == 0.0 {
                    self.context.wall_time = before.wall_time;
                }
                self.insert_action(ActionEntry {
                    call_id: before.call_id,
                    start_time: before.start_time,
                    end_time: 0.0,
                    api_name: before.api_name,
                    class: before.class,
                    method: before.method,
                    params: before.params,
                    wall_time: before.wall_time,
                    before_snapshot: before.before_snapshot,
                    page_id: before.page_id,
                    parent_id: before.parent_id,
                    step_id: before.step_id,
                    stack: before.stack,
                    ..ActionEntry::default()
                });
            }
            TraceEvent::Input(input) => {
                if let Some(action) = self.action_mut(&input.call_id) {
                    action.input_snapshot = input.input_snapshot;
                    action.point = input.point;
                }
            }
            TraceEvent::Log(log) => {
                if let Some(action) = self.action_mut(&log.call_id) {
                    action.log.push(LogEntry {
                        time: log.time,
                        message: log.message,
                    });
                }
            }
            TraceEvent::After(after) => {
                let Some(index) = self.action_index.get(&after.call_id).copied() else {
                    debug!(call_id = %after.call_id, "Ignoring after event for unknown call");
                    return;
                };
                self.context.widen(f64::MAX, after.end_time);
                for attachment in after.attachments.iter().flatten() {
                    if let Some(sha1) = &attachment.sha1 {
                        self.attachments.insert(sha1.clone(), attachment.clone());
                    }
                }
                let action = &mut self.actions[index];
                action.after_snapshot = after.after_snapshot;
                action.end_time = after.end_time;
                action.result = after.result;
                action.error = after.error;
                action.attachments = after.attachments;
                if after.point.is_some() {
                    action.point = after.point;
                }
            }
            TraceEvent::Action(action) => {
                self.context.widen(action.start_time, action.end_time);
                self.insert_action(ActionEntry {
                    call_id: action.call_id,
                    start_time: action.start_time,
                    end_time: action.end_time,
                    api_name: action.api_name,
                    class: action.class,
                    method: action.method,
                    params: action.params,
                    wall_time: action.wall_time,
                    before_snapshot: action.before_snapshot,
                    input_snapshot: action.input_snapshot,
                    after_snapshot: action.after_snapshot,
                    error: action.error,
                    result: action.result,
                    point: action.point,
                    page_id: action.page_id,
                    parent_id: action.parent_id,
                    ..ActionEntry::default()
                });
            }
            TraceEvent::Event(event) => {
                self.context.widen(event.time, event.time);
                self.context.events.push(ContextEvent::Event(event));
            }
            TraceEvent::Console(console) => {
                self.context.events.push(ContextEvent::Console(console));
            }
            TraceEvent::Stdout(event) => self.context.stdio.push(StdioEntry {
                stream: StdioStream::Stdout,
                event,
            }),
            TraceEvent::Stderr(event) => self.context.stdio.push(StdioEntry {
                stream: StdioStream::Stderr,
                event,
            }),
            TraceEvent::Error(error) => self.context.errors.push(error),
            TraceEvent::ResourceSnapshot(event) => {
                let resource = self.storage.add_resource(&self.context.id, event.snapshot);
                self.context.resources.push(resource);
            }
            TraceEvent::FrameSnapshot(event) => {
                self.storage.add_frame_snapshot(&self.context.id, event.snapshot);
            }
            TraceEvent::Unknown => {}
        }
    }

    /// Close the context: order actions, terminate dangling ones on finalized
    /// archives and backfill call-site stacks.
    pub(crate) fn finish(
        self,
        is_live: bool,
        stacks: Option<&HashMap<CallId, Vec<StackFrame>>>,
    ) -> ContextEntry {
        let mut context = self.context;
        let mut actions = self.actions;
        actions.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

        if !is_live {
            for i in (0..actions.len()).rev() {
                if actions[i].end_time != 0.0 || actions[i].error.is_some() {
                    continue;
                }
                let call_id = actions[i].call_id.clone();
                let latest_child = actions
                    .iter()
                    .filter(|a| a.parent_id.as_deref() == Some(call_id.as_str()))
                    .map(|a| a.end_time)
                    .fold(actions[i].end_time, f64::max);
                actions[i].end_time = latest_child;
            }
        }

        if let Some(stacks) = stacks {
            for action in actions.iter_mut().filter(|a| a.stack.is_none()) {
                action.stack = stacks.get(&action.call_id).cloned();
            }
        }

        debug!(
            context = %context.id,
            actions = actions.len(),
            events = context.events.len(),
            resources = context.resources.len(),
            "Folded context"
        );
        context.actions = actions;
        context
    }

    fn insert_action(&mut self, action: ActionEntry) {
        match self.action_index.get(&action.call_id) {
            Some(index) => self.actions[*index] = action,
            None => {
                self.action_index
                    .insert(action.call_id.clone(), self.actions.len());
                self.actions.push(action);
            }
        }
    }

    fn action_mut(&mut self, call_id: &str) -> Option<&mut ActionEntry> {
        match self.action_index.get(call_id) {
            Some(index) => Some(&mut self.actions[*index]),
            None => {
                debug!(call_id = %call_id, "Ignoring event for unknown call");
                None
            }
        }
    }

    fn page_entry(&mut self, page_id: &str) -> &mut PageEntry {
        let pages = &mut self.context.pages;
        let index = match pages.iter().position(|p| p.page_id == page_id) {
            Some(index) => index,
            None => {
                pages.push(PageEntry {
                    page_id: page_id.to_string(),
                    screencast_frames: Vec::new(),
                });
                pages.len() - 1
            }
        };
        &mut pages[index]
    }
}
