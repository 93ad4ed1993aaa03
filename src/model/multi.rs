//! Multi-context view.
//!
//! A test run records a test-runner context (steps, assertions, client-side
//! clock) next to one or more library contexts (protocol calls, server-side
//! clock). This module merges them into one action list on the library clock
//! and builds the cross-context indices the viewer queries.

use super::entries::{ActionEntry, ContextEntry, ContextEvent, PageEntry, StdioEntry};
use crate::trace::snapshot::ResourceSnapshot;
use crate::trace::{Attachment, BrowserContextOptions, ContextOrigin, ErrorEvent, StackFrame};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Error surfaced in the viewer's error list.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDescriptor {
    /// Index into [`MultiTraceModel::actions`], when the error belongs to one
    pub action: Option<usize>,
    pub stack: Option<Vec<StackFrame>>,
    pub message: String,
}

/// Attachment together with the trace it can be fetched from.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceAttachment {
    pub attachment: Attachment,
    pub trace_url: String,
}

#[derive(Debug, Clone)]
pub struct MultiTraceModel {
    pub contexts: Vec<ContextEntry>,
    pub start_time: f64,
    pub end_time: f64,
    pub wall_time: Option<f64>,
    pub browser_name: String,
    pub channel: Option<String>,
    pub platform: String,
    pub title: String,
    pub sdk_language: Option<String>,
    pub test_id_attribute_name: Option<String>,
    pub options: BrowserContextOptions,
    pub has_source: bool,
    /// Whether a test-runner context is present
    pub has_step_data: bool,
    /// Merged actions, ordered by start time with parents before children
    pub actions: Vec<ActionEntry>,
    pub events: Vec<ContextEvent>,
    pub stdio: Vec<StdioEntry>,
    pub errors: Vec<ErrorEvent>,
    pub resources: Vec<ResourceSnapshot>,
    pub attachments: Vec<TraceAttachment>,
    pub error_descriptors: Vec<ErrorDescriptor>,
    /// action index -> owning context index
    action_context: Vec<usize>,
    /// context index -> its action indices in start order
    context_actions: Vec<Vec<usize>>,
    /// action index -> next non-`Route` action of the same context
    next_in_context: Vec<Option<usize>>,
}

impl MultiTraceModel {
    pub fn new(mut contexts: Vec<ContextEntry>) -> Self {
        let (actions, action_context) = merge_actions(&mut contexts);

        let library = contexts.iter().find(|c| c.origin == ContextOrigin::Library);
        let browser_name = library.map(|c| c.browser_name.clone()).unwrap_or_default();
        let channel = library.and_then(|c| c.channel.clone());
        let platform = library.and_then(|c| c.platform.clone()).unwrap_or_default();
        let title = library.and_then(|c| c.title.clone()).unwrap_or_default();
        let sdk_language = library.and_then(|c| c.sdk_language.clone());
        let test_id_attribute_name = library.and_then(|c| c.test_id_attribute_name.clone());
        let options = library.map(|c| c.options.clone()).unwrap_or_default();

        let wall_time = contexts
            .iter()
            .map(|c| c.wall_time)
            .filter(|t| *t != 0.0)
            .reduce(f64::min);
        let start_time = contexts.iter().map(|c| c.start_time).fold(f64::MAX, f64::min);
        let end_time = contexts.iter().map(|c| c.end_time).fold(f64::MIN_POSITIVE, f64::max);

        let mut events: Vec<ContextEvent> =
            contexts.iter().flat_map(|c| c.events.iter().cloned()).collect();
        events.sort_by(|a, b| a.time().total_cmp(&b.time()));
        let stdio = contexts.iter().flat_map(|c| c.stdio.iter().cloned()).collect();
        let errors: Vec<ErrorEvent> =
            contexts.iter().flat_map(|c| c.errors.iter().cloned()).collect();
        let mut resources: Vec<ResourceSnapshot> =
            contexts.iter().flat_map(|c| c.resources.iter().cloned()).collect();
        resources.sort_by(|a, b| {
            a.monotonic_time
                .unwrap_or(0.0)
                .total_cmp(&b.monotonic_time.unwrap_or(0.0))
        });

        let attachments = actions
            .iter()
            .zip(&action_context)
            .flat_map(|(action, context)| {
                let trace_url = contexts[*context].trace_url.clone();
                action
                    .attachments
                    .iter()
                    .flatten()
                    .map(move |attachment| TraceAttachment {
                        attachment: attachment.clone(),
                        trace_url: trace_url.clone(),
                    })
            })
            .collect();

        let mut context_actions = vec![Vec::new(); contexts.len()];
        for (index, context) in action_context.iter().enumerate() {
            context_actions[*context].push(index);
        }
        for indices in context_actions.iter_mut() {
            indices.sort_by(|a, b| actions[*a].start_time.total_cmp(&actions[*b].start_time));
        }
        let mut next_in_context = vec![None; actions.len()];
        for indices in &context_actions {
            let mut next = None;
            for index in indices.iter().rev() {
                next_in_context[*index] = next;
                if actions[*index].class != "Route" {
                    next = Some(*index);
                }
            }
        }

        let has_step_data = contexts.iter().any(|c| c.origin == ContextOrigin::TestRunner);
        let error_descriptors: Vec<ErrorDescriptor> = if has_step_data {
            errors
                .iter()
                .filter(|e| !e.message.is_empty())
                .map(|e| ErrorDescriptor {
                    action: None,
                    stack: e.stack.clone(),
                    message: e.message.clone(),
                })
                .collect()
        } else {
            actions
                .iter()
                .enumerate()
                .filter_map(|(index, action)| {
                    let error = action.error.as_ref().filter(|e| !e.message.is_empty())?;
                    Some(ErrorDescriptor {
                        action: Some(index),
                        stack: action.stack.clone(),
                        message: error.message.clone(),
                    })
                })
                .collect()
        };

        debug!(
            contexts = contexts.len(),
            actions = actions.len(),
            errors = error_descriptors.len(),
            "Built multi-context model"
        );

        Self {
            has_source: contexts.iter().any(|c| c.has_source),
            contexts,
            start_time,
            end_time,
            wall_time,
            browser_name,
            channel,
            platform,
            title,
            sdk_language,
            test_id_attribute_name,
            options,
            has_step_data,
            actions,
            events,
            stdio,
            errors,
            resources,
            attachments,
            error_descriptors,
            action_context,
            context_actions,
            next_in_context,
        }
    }

    /// Pages of every context.
    pub fn pages(&self) -> impl Iterator<Item = &PageEntry> {
        self.contexts.iter().flat_map(|c| c.pages.iter())
    }

    /// Attachments not hidden by a leading underscore.
    pub fn visible_attachments(&self) -> impl Iterator<Item = &TraceAttachment> {
        self.attachments
            .iter()
            .filter(|a| !a.attachment.name.starts_with('_'))
    }

    /// Context an action was recorded in.
    pub fn context_of(&self, action: usize) -> Option<&ContextEntry> {
        self.action_context.get(action).map(|c| &self.contexts[*c])
    }

    /// Actions recorded in one context, in start order.
    pub fn actions_in_context(&self, context: usize) -> impl Iterator<Item = &ActionEntry> {
        self.context_actions
            .get(context)
            .into_iter()
            .flatten()
            .map(|index| &self.actions[*index])
    }

    /// Next non-`Route` action of the same context.
    pub fn next_in_context(&self, action: usize) -> Option<&ActionEntry> {
        self.next_in_context
            .get(action)
            .copied()
            .flatten()
            .map(|index| &self.actions[index])
    }

    /// Context events that happened while an action was the latest one.
    pub fn events_for_action(&self, action: usize) -> Vec<&ContextEvent> {
        let (Some(entry), Some(context)) = (self.actions.get(action), self.context_of(action)) else {
            return Vec::new();
        };
        let until = self.next_in_context(action).map(|next| next.start_time);
        context
            .events
            .iter()
            .filter(|event| {
                event.time() >= entry.start_time && until.map_or(true, |until| event.time() < until)
            })
            .collect()
    }

    /// Innermost action that failed.
    pub fn failed_action(&self) -> Option<&ActionEntry> {
        self.actions.iter().rev().find(|a| a.error.is_some())
    }

    pub fn action(&self, call_id: &str) -> Option<&ActionEntry> {
        self.actions.iter().find(|a| a.call_id == call_id)
    }
}

/// Merge the actions of all contexts, reconciling runner and library clocks
/// within each trace file. Returns the actions and their owning context.
fn merge_actions(contexts: &mut [ContextEntry]) -> (Vec<ActionEntry>, Vec<usize>) {
    let mut trace_files: Vec<(String, Vec<usize>)> = Vec::new();
    for (index, context) in contexts.iter().enumerate() {
        match trace_files.iter_mut().find(|(url, _)| *url == context.trace_url) {
            Some((_, indices)) => indices.push(index),
            None => trace_files.push((context.trace_url.clone(), vec![index])),
        }
    }

    let unique_ids = trace_files.len() > 1;
    let mut merged: Vec<(ActionEntry, usize)> = Vec::new();
    for (file_id, (_, indices)) in trace_files.iter().enumerate() {
        if unique_ids {
            // call ids are only unique within one trace file
            for index in indices {
                for action in contexts[*index].actions.iter_mut() {
                    action.call_id = format!("{}:{}", file_id + 1, action.call_id);
                    if let Some(parent) = action.parent_id.as_mut() {
                        *parent = format!("{}:{}", file_id + 1, parent);
                    }
                }
            }
        }
        merged.extend(merge_same_trace(contexts, indices));
    }

    merged.sort_by(|(a, _), (b, _)| by_start_time(a, b));
    parents_first(merged).into_iter().unzip()
}

fn by_start_time(a: &ActionEntry, b: &ActionEntry) -> std::cmp::Ordering {
    a.start_time
        .total_cmp(&b.start_time)
        .then_with(|| a.call_id.cmp(&b.call_id))
}

/// Reorder time-sorted actions so each one follows its parent, when the parent
/// is part of the set. Otherwise the time order is kept.
fn parents_first(sorted: Vec<(ActionEntry, usize)>) -> Vec<(ActionEntry, usize)> {
    let present: HashSet<String> = sorted.iter().map(|(a, _)| a.call_id.clone()).collect();
    let mut emitted: HashSet<String> = HashSet::new();
    let mut waiting: HashMap<String, Vec<(ActionEntry, usize)>> = HashMap::new();
    let mut ordered = Vec::with_capacity(sorted.len());

    for entry in sorted {
        match entry.0.parent_id.clone() {
            Some(parent) if present.contains(&parent) && !emitted.contains(&parent) => {
                waiting.entry(parent).or_default().push(entry);
            }
            _ => {
                let mut ready = vec![entry];
                while let Some(next) = ready.pop() {
                    emitted.insert(next.0.call_id.clone());
                    if let Some(children) = waiting.remove(&next.0.call_id) {
                        ready.extend(children.into_iter().rev());
                    }
                    ordered.push(next);
                }
            }
        }
    }

    // Parent chains that loop back on themselves never become ready.
    let mut stranded: Vec<(ActionEntry, usize)> = waiting.into_values().flatten().collect();
    if !stranded.is_empty() {
        debug!(count = stranded.len(), "Actions with cyclic parents kept in time order");
        stranded.sort_by(|(a, _), (b, _)| by_start_time(a, b));
        ordered.extend(stranded);
    }
    ordered
}

fn merge_same_trace(contexts: &mut [ContextEntry], indices: &[usize]) -> Vec<(ActionEntry, usize)> {
    let library: Vec<usize> = indices
        .iter()
        .copied()
        .filter(|i| contexts[*i].origin == ContextOrigin::Library)
        .collect();
    let runner: Vec<usize> = indices
        .iter()
        .copied()
        .filter(|i| contexts[*i].origin == ContextOrigin::TestRunner)
        .collect();

    let mut merged: Vec<(ActionEntry, usize)> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    let mut offset = 0.0;
    for context in &library {
        for action in &contexts[*context].actions {
            by_key.insert(merge_key(action), merged.len());
            merged.push((action.clone(), *context));
        }
        if offset == 0.0 {
            if let Some(first) = contexts[*context].actions.first() {
                offset = first.start_time - first.wall_time;
            }
        }
    }

    let mut claimed = HashSet::new();
    for context in &runner {
        for action in &contexts[*context].actions {
            let mut action = action.clone();
            if offset != 0.0 {
                let duration = action.end_time - action.start_time;
                if action.start_time != 0.0 {
                    action.start_time = action.wall_time + offset;
                }
                if action.end_time != 0.0 {
                    action.end_time = action.start_time + duration;
                }
            }
            let key = merge_key(&action);
            if let Some(existing) = by_key.get(&key).copied() {
                if claimed.insert(existing) {
                    let existing = &mut merged[existing].0;
                    if action.error.is_some() {
                        existing.error = action.error;
                    }
                    if action.attachments.is_some() {
                        existing.attachments = action.attachments;
                    }
                    continue;
                }
            }
            by_key.insert(key, merged.len());
            merged.push((action, *context));
        }
    }
    merged
}

fn merge_key(action: &ActionEntry) -> String {
    format!("{}@{}", action.api_name, action.wall_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{ActionError, ConsoleLocation, ConsoleMessageEvent, EventTraceEvent};
    use serde_json::Value;

    fn action(call_id: &str, api_name: &str, start: f64, end: f64, wall: f64) -> ActionEntry {
        ActionEntry {
            call_id: call_id.to_string(),
            api_name: api_name.to_string(),
            class: "Frame".to_string(),
            start_time: start,
            end_time: end,
            wall_time: wall,
            ..ActionEntry::default()
        }
    }

    fn context(id: &str, origin: ContextOrigin, actions: Vec<ActionEntry>) -> ContextEntry {
        let mut context = ContextEntry::new(id, "trace.zip");
        context.origin = origin;
        context.actions = actions;
        context
    }

    fn event(time: f64) -> ContextEvent {
        ContextEvent::Event(EventTraceEvent {
            time,
            class: "Page".to_string(),
            method: "navigated".to_string(),
            params: Value::Null,
            page_id: None,
        })
    }

    #[test]
    fn test_runner_actions_merge_into_library_clock() {
        let library = context(
            "0",
            ContextOrigin::Library,
            vec![action("call@1", "page.click", 100.0, 110.0, 1000.0)],
        );
        let mut failed = action("step@1", "page.click", 5.0, 9.0, 1000.0);
        failed.error = Some(ActionError {
            message: "timeout".to_string(),
            name: None,
            stack: None,
        });
        let runner = context(
            "1",
            ContextOrigin::TestRunner,
            vec![failed, action("step@2", "expect.toBe", 10.0, 12.0, 1020.0)],
        );

        let model = MultiTraceModel::new(vec![library, runner]);
        assert_eq!(model.actions.len(), 2);
        let click = model.action("call@1").unwrap();
        assert_eq!(click.error.as_ref().unwrap().message, "timeout");
        let expect = model.action("step@2").unwrap();
        // shifted onto the library clock, duration kept
        assert_eq!(expect.start_time, 120.0);
        assert_eq!(expect.end_time, 122.0);
        assert!(model.has_step_data);
        assert_eq!(model.failed_action().unwrap().call_id, "call@1");
    }

    #[test]
    fn test_next_in_context_skips_route() {
        let mut route = action("call@2", "route.continue", 2.0, 3.0, 2.0);
        route.class = "Route".to_string();
        let library = context(
            "0",
            ContextOrigin::Library,
            vec![
                action("call@1", "page.goto", 1.0, 2.0, 1.0),
                route,
                action("call@3", "page.click", 5.0, 6.0, 5.0),
            ],
        );
        let model = MultiTraceModel::new(vec![library]);
        assert_eq!(model.next_in_context(0).unwrap().call_id, "call@3");
        assert_eq!(model.next_in_context(1).unwrap().call_id, "call@3");
        assert!(model.next_in_context(2).is_none());
        assert_eq!(model.context_of(2).unwrap().id, "0");
        assert_eq!(model.actions_in_context(0).count(), 3);
    }

    #[test]
    fn test_events_for_action_window() {
        let mut library = context(
            "0",
            ContextOrigin::Library,
            vec![
                action("call@1", "page.goto", 1.0, 2.0, 1.0),
                action("call@2", "page.click", 5.0, 6.0, 5.0),
            ],
        );
        library.events = vec![event(0.5), event(1.0), event(4.9), event(5.0), event(8.0)];
        let model = MultiTraceModel::new(vec![library]);
        let times: Vec<f64> = model.events_for_action(0).iter().map(|e| e.time()).collect();
        assert_eq!(times, vec![1.0, 4.9]);
        let times: Vec<f64> = model.events_for_action(1).iter().map(|e| e.time()).collect();
        assert_eq!(times, vec![5.0, 8.0]);
        assert!(model.events_for_action(7).is_empty());
    }

    #[test]
    fn test_error_descriptors_from_actions() {
        let mut failing = action("call@1", "page.click", 1.0, 2.0, 1.0);
        failing.error = Some(ActionError {
            message: "boom".to_string(),
            name: Some("Error".to_string()),
            stack: None,
        });
        let mut library = context("0", ContextOrigin::Library, vec![failing]);
        library.events.push(ContextEvent::Console(ConsoleMessageEvent {
            time: 1.5,
            page_id: None,
            message_type: "log".to_string(),
            text: "hi".to_string(),
            args: None,
            location: ConsoleLocation::default(),
        }));
        let model = MultiTraceModel::new(vec![library]);
        assert_eq!(model.error_descriptors.len(), 1);
        assert_eq!(model.error_descriptors[0].action, Some(0));
        assert_eq!(model.error_descriptors[0].message, "boom");
    }

    #[test]
    fn test_error_descriptors_from_runner() {
        let mut runner = context("1", ContextOrigin::TestRunner, Vec::new());
        runner.errors.push(ErrorEvent {
            message: "expect failed".to_string(),
            stack: None,
        });
        runner.errors.push(ErrorEvent {
            message: String::new(),
            stack: None,
        });
        let model = MultiTraceModel::new(vec![runner]);
        assert_eq!(model.error_descriptors.len(), 1);
        assert_eq!(model.error_descriptors[0].action, None);
    }

    #[test]
    fn test_call_ids_unique_across_trace_files() {
        let a = context("0", ContextOrigin::Library, vec![action("call@1", "a", 1.0, 2.0, 1.0)]);
        let mut b = context("0", ContextOrigin::Library, vec![action("call@1", "b", 3.0, 4.0, 3.0)]);
        b.trace_url = "other.zip".to_string();
        let model = MultiTraceModel::new(vec![a, b]);
        let ids: Vec<&str> = model.actions.iter().map(|a| a.call_id.as_str()).collect();
        assert_eq!(ids, vec!["1:call@1", "2:call@1"]);
    }

    #[test]
    fn test_parent_sorts_before_child() {
        let parent = action("call@1", "test.step", 5.0, 9.0, 5.0);
        let mut child = action("call@2", "page.click", 5.0, 6.0, 5.0);
        child.parent_id = Some("call@1".to_string());
        let model = MultiTraceModel::new(vec![context("0", ContextOrigin::Library, vec![child, parent])]);
        assert_eq!(model.actions[0].call_id, "call@1");
        assert_eq!(model.actions[1].call_id, "call@2");
    }

    #[test]
    fn test_child_starting_before_parent_follows_it() {
        let mut actions: Vec<ActionEntry> = (0..40)
            .map(|i| action(&format!("call@{}", i + 10), "page.click", i as f64 * 7.0 % 23.0, 200.0, 1.0))
            .collect();
        let parent = action("call@1", "test.step", 100.0, 150.0, 1.0);
        let mut child = action("call@2", "page.click", 50.0, 60.0, 1.0);
        child.parent_id = Some("call@1".to_string());
        let mut grandchild = action("call@3", "page.fill", 40.0, 45.0, 1.0);
        grandchild.parent_id = Some("call@2".to_string());
        actions.push(grandchild);
        actions.push(child);
        actions.push(parent);

        let model = MultiTraceModel::new(vec![context("0", ContextOrigin::Library, actions)]);
        let position = |id: &str| model.actions.iter().position(|a| a.call_id == id).unwrap();
        assert_eq!(model.actions.len(), 43);
        assert!(position("call@1") < position("call@2"));
        assert!(position("call@2") < position("call@3"));
        let unparented: Vec<f64> = model
            .actions
            .iter()
            .filter(|a| a.parent_id.is_none() && a.call_id != "call@1")
            .map(|a| a.start_time)
            .collect();
        assert!(unparented.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_cyclic_parents_do_not_drop_actions() {
        let mut a = action("call@1", "page.click", 1.0, 2.0, 1.0);
        a.parent_id = Some("call@2".to_string());
        let mut b = action("call@2", "page.click", 3.0, 4.0, 1.0);
        b.parent_id = Some("call@1".to_string());
        let free = action("call@3", "page.click", 2.0, 3.0, 1.0);
        let model = MultiTraceModel::new(vec![context("0", ContextOrigin::Library, vec![a, b, free])]);
        let ids: Vec<&str> = model.actions.iter().map(|a| a.call_id.as_str()).collect();
        assert_eq!(ids, vec!["call@3", "call@1", "call@2"]);
    }
}
