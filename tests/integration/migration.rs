use super::support::{after, before, context_options, ArchiveBuilder};
use serde_json::json;
use tracescope::backend::no_progress;
use tracescope::trace::ContextOrigin;
use tracescope::{TraceError, TraceModel};

#[tokio::test]
async fn test_unversioned_action_error_is_structured() {
    let archive = ArchiveBuilder::new().log(
        "0.trace",
        &[
            json!({
                "type": "context-options",
                "browserName": "firefox",
                "options": {"viewport": {"width": 800, "height": 600}},
                "wallTime": 1000,
                "monotonicTime": 0
            }),
            json!({
                "type": "action",
                "metadata": {
                    "id": "call@1",
                    "type": "Frame",
                    "method": "click",
                    "params": {"selector": "#go"},
                    "startTime": 10,
                    "endTime": 25,
                    "wallTime": 1010,
                    "log": ["waiting for #go"],
                    "snapshots": [{"title": "before", "snapshotName": "before@call@1"}],
                    "error": "boom"
                }
            }),
        ],
    );

    let model = TraceModel::load(archive.backend("old.zip"), no_progress())
        .await
        .unwrap();
    let context = &model.context_entries[0];
    assert_eq!(context.browser_name, "firefox");
    assert_eq!(context.origin, ContextOrigin::Library);

    let action = context.action("call@1").unwrap();
    assert_eq!(action.api_name, "Frame.click");
    assert_eq!(action.before_snapshot.as_deref(), Some("before@call@1"));
    assert_eq!(action.end_time, 25.0);
    let error = action.error.as_ref().unwrap();
    assert_eq!(error.message, "boom");
    assert_eq!(error.name.as_deref(), Some("Error"));
    assert_eq!(action.log.len(), 1);
    assert_eq!(action.log[0].message, "waiting for #go");
}

#[tokio::test]
async fn test_two_versions_old_string_error() {
    let mut failed = after("call@1", 20.0);
    failed["error"] = json!("boom");
    let archive = ArchiveBuilder::new().log(
        "0.trace",
        &[context_options(5), before("call@1", "page.click", 10.0, 1010.0), failed],
    );

    let model = TraceModel::load(archive.backend("v5.zip"), no_progress())
        .await
        .unwrap();
    let action = model.context_entries[0].action("call@1").unwrap();
    assert_eq!(action.error.as_ref().unwrap().message, "boom");

    let merged = model.multi_trace();
    assert_eq!(merged.error_descriptors.len(), 1);
    assert_eq!(merged.error_descriptors[0].message, "boom");
    assert_eq!(merged.failed_action().map(|a| a.call_id.as_str()), Some("call@1"));
}

#[tokio::test]
async fn test_newer_version_is_rejected() {
    let archive = ArchiveBuilder::new().log(
        "0.trace",
        &[context_options(8), before("call@1", "page.goto", 10.0, 1010.0)],
    );
    let err = TraceModel::load(archive.backend("future.zip"), no_progress())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TraceError::UnsupportedVersion {
            found: 8,
            latest: 7
        }
    ));
    assert!(err.to_string().contains("newer version"));
}

#[tokio::test]
async fn test_runner_log_merges_onto_library_clock() {
    let mut library_after = after("call@1", 520.0);
    library_after["afterSnapshot"] = json!("after@call@1");
    let mut runner_after = after("call@1", 9.0);
    runner_after["error"] = json!({"message": "Timed out", "name": "TimeoutError"});

    let archive = ArchiveBuilder::new()
        .log(
            "0.trace",
            &[
                context_options(7),
                before("call@1", "page.click", 500.0, 1100.0),
                library_after,
            ],
        )
        .log(
            "1.trace",
            &[
                before("call@1", "page.click", 3.0, 1100.0),
                runner_after,
                before("step@2", "expect.toBe", 10.0, 1200.0),
                after("step@2", 12.0),
                json!({"type": "error", "message": "Timed out"}),
            ],
        );

    let model = TraceModel::load(archive.backend("run.zip"), no_progress())
        .await
        .unwrap();
    assert_eq!(model.context_entries[1].origin, ContextOrigin::TestRunner);

    let merged = model.multi_trace();
    assert!(merged.has_step_data);
    assert_eq!(merged.actions.len(), 2);

    let click = merged.action("call@1").unwrap();
    assert_eq!(click.start_time, 500.0);
    assert_eq!(click.after_snapshot.as_deref(), Some("after@call@1"));
    assert_eq!(click.error.as_ref().unwrap().message, "Timed out");

    let step = merged.action("step@2").unwrap();
    assert_eq!(step.start_time, 600.0);
    assert_eq!(step.end_time, 602.0);

    assert_eq!(merged.error_descriptors.len(), 1);
    assert!(merged.error_descriptors[0].action.is_none());
}
