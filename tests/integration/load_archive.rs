use super::support::{after, before, context_options, resource, ArchiveBuilder};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tracescope::backend::{no_progress, MemoryBackend, TraceBackend, ZipTraceBackend};
use tracescope::{TraceError, TraceModel};

fn basic_archive() -> ArchiveBuilder {
    ArchiveBuilder::new()
        .log(
            "0.trace",
            &[
                context_options(7),
                before("call@1", "page.goto", 10.0, 1010.0),
                after("call@1", 30.0),
            ],
        )
        .log(
            "0.network",
            &[resource("http://example.com/app.css", "frame@1", 200, Some("css-sha"), 5.0)],
        )
        .entry(
            "0.stacks",
            json!({"files": ["app.spec.ts"], "stacks": [[1, [[0, 12, 5, "run"]]]]}).to_string(),
        )
        .entry("resources/css-sha", "body{}")
}

#[tokio::test]
async fn test_load_archive_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = basic_archive().write_to(dir.path(), "trace.zip");
    let locator = path.to_string_lossy().to_string();
    let backend: Arc<dyn TraceBackend> = Arc::new(ZipTraceBackend::new(locator.clone(), no_progress()));

    let model = TraceModel::load(backend, no_progress()).await.unwrap();
    assert_eq!(model.trace_url(), locator);
    assert_eq!(model.context_entries.len(), 1);

    let context = &model.context_entries[0];
    assert_eq!(context.browser_name, "chromium");
    assert_eq!(context.resources.len(), 1);
    assert_eq!(context.actions.len(), 1);

    let action = &context.actions[0];
    assert_eq!(action.api_name, "page.goto");
    assert_eq!(action.end_time, 30.0);
    let stack = action.stack.as_ref().unwrap();
    assert_eq!(stack[0].file, "app.spec.ts");
    assert_eq!(stack[0].line, 12);
    assert_eq!(stack[0].function.as_deref(), Some("run"));
}

#[tokio::test]
async fn test_resource_carries_recorded_content_type() {
    let model = TraceModel::load(basic_archive().backend("trace.zip"), no_progress())
        .await
        .unwrap();

    assert_eq!(model.content_type("css-sha"), Some("text/css"));
    let blob = model.resource_for_sha1("css-sha").await.unwrap().unwrap();
    assert_eq!(blob.bytes, b"body{}");
    assert_eq!(blob.content_type.as_deref(), Some("text/css"));
    assert!(model.resource_for_sha1("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_progress_reaches_total() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    TraceModel::load(
        basic_archive().backend("trace.zip"),
        Arc::new(move |done: u64, total: u64| sink.lock().push((done, total))),
    )
    .await
    .unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen.last(), Some(&(3, 3)));
}

#[tokio::test]
async fn test_report_bundle_is_not_a_trace() {
    let backend = ArchiveBuilder::new()
        .entry("index.html", "<html></html>")
        .entry("data/abc.zip", "zip")
        .backend("report.zip");
    let err = TraceModel::load(backend, no_progress()).await.unwrap_err();
    assert!(matches!(err, TraceError::ReportNotTrace));
}

#[tokio::test]
async fn test_archive_without_trace_entry() {
    let backend = ArchiveBuilder::new().entry("notes.txt", "hi").backend("empty.zip");
    let err = TraceModel::load(backend, no_progress()).await.unwrap_err();
    assert!(matches!(err, TraceError::MissingTrace));
}

#[tokio::test]
async fn test_unreadable_archive_is_transport_error() {
    let missing: Arc<dyn TraceBackend> = Arc::new(ZipTraceBackend::new(
        "/nonexistent/tracescope/trace.zip",
        no_progress(),
    ));
    let err = TraceModel::load(missing, no_progress()).await.unwrap_err();
    assert!(err.is_transport());

    assert!(ZipTraceBackend::from_bytes("garbage.zip", vec![1, 2, 3]).is_err());
}

#[tokio::test]
async fn test_unfinished_action_takes_end_of_children() {
    let log = [
        context_options(7),
        before("call@1", "test.step", 10.0, 1010.0),
        {
            let mut child = before("call@2", "page.click", 12.0, 1012.0);
            child["parentId"] = json!("call@1");
            child
        },
        after("call@2", 40.0),
    ];
    let archive = ArchiveBuilder::new().log("0.trace", &log);

    let model = TraceModel::load(archive.backend("trace.zip"), no_progress())
        .await
        .unwrap();
    let parent = model.context_entries[0].action("call@1").unwrap();
    assert_eq!(parent.end_time, 40.0);

    // a live run may still finish the step
    let text = log.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n");
    let live: Arc<dyn TraceBackend> =
        Arc::new(MemoryBackend::new("live.json").live(true).with_entry("0.trace", text));
    let model = TraceModel::load(live, no_progress()).await.unwrap();
    assert_eq!(model.context_entries[0].action("call@1").unwrap().end_time, 0.0);
}

#[tokio::test]
async fn test_corrupted_lines_are_skipped() {
    let archive = ArchiveBuilder::new().entry(
        "0.trace",
        [
            context_options(7).to_string(),
            json!({"type": "before", "startTime": 3}).to_string(),
            json!({"type": "after", "callId": "call@404", "endTime": 3}).to_string(),
            before("call@1", "page.goto", 10.0, 1010.0).to_string(),
            after("call@1", 20.0).to_string(),
        ]
        .join("\n"),
    );
    let model = TraceModel::load(archive.backend("trace.zip"), no_progress())
        .await
        .unwrap();
    let actions = &model.context_entries[0].actions;
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].call_id, "call@1");
}
