use super::support::{body, context_options, frame_snapshot, resource, ArchiveBuilder};
use serde_json::json;
use tracescope::backend::no_progress;
use tracescope::TraceModel;

const STYLE_URL: &str = "http://x/style.css";

async fn load() -> TraceModel {
    let mut overridden = frame_snapshot(
        "before@call@2",
        30.0,
        json!(["HTML", {}, [[2, 0]], [[1, 2]]]),
    );
    overridden["snapshot"]["resourceOverrides"] = json!([{"url": STYLE_URL, "sha1": "override-sha"}]);

    let archive = ArchiveBuilder::new()
        .log(
            "0.trace",
            &[
                context_options(7),
                frame_snapshot(
                    "before@call@1",
                    10.0,
                    json!(["HTML", {}, ["HEAD", {}], ["BODY", {}, ["DIV", {"id": "a"}, "hello"]]]),
                ),
                frame_snapshot(
                    "after@call@1",
                    20.0,
                    json!(["HTML", {}, [[1, 0]], ["BODY", {}, [[1, 2]], ["P", {}, "new"]]]),
                ),
                overridden,
                frame_snapshot("broken", 40.0, json!(["HTML", {}, [[9, 0]], [[1, 99]], "tail"])),
            ],
        )
        .log(
            "0.network",
            &[
                resource(STYLE_URL, "frame@2", 200, Some("other-frame"), 1.0),
                resource(STYLE_URL, "frame@1", 200, Some("same-frame"), 2.0),
                resource(STYLE_URL, "frame@1", 304, None, 3.0),
                resource(STYLE_URL, "frame@1", 200, Some("too-late"), 50.0),
                resource("http://x/late.js", "frame@1", 200, Some("late"), 15.0),
                resource("http://x/img.png", "frame@2", 200, Some("img"), 4.0),
            ],
        );
    TraceModel::load(archive.backend("snapshots.zip"), no_progress())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_subtree_references_resolve_across_history() {
    let model = load().await;
    let storage = model.storage();
    let render = |name: &str| {
        storage
            .snapshot_by_name("page@1", name)
            .unwrap()
            .render()
            .html
            .to_string()
    };

    let first = render("before@call@1");
    assert!(first.starts_with("<!DOCTYPE html>"));
    assert_eq!(
        body(&first),
        "<HTML><HEAD></HEAD><BODY><DIV id=\"a\">hello</DIV></BODY></HTML>"
    );

    // distance 1: HEAD and DIV come from the snapshot just before
    assert_eq!(
        body(&render("after@call@1")),
        "<HTML><HEAD></HEAD><BODY><DIV id=\"a\">hello</DIV><P>new</P></BODY></HTML>"
    );

    // distance 2 reaches the first snapshot; the BODY reference chains through
    // the second one
    assert_eq!(
        body(&render("before@call@2")),
        "<HTML><HEAD></HEAD><BODY><DIV id=\"a\">hello</DIV><P>new</P></BODY></HTML>"
    );

    // references outside the history render as nothing
    assert_eq!(body(&render("broken")), "<HTML>tail</HTML>");
}

#[tokio::test]
async fn test_render_is_deterministic() {
    let model = load().await;
    let renderer = model.storage().snapshot_by_name("frame@1", "before@call@2").unwrap();
    let once = renderer.render();
    let twice = renderer.render();
    assert_eq!(once.html, twice.html);
    assert_eq!(once.index, 2);
    assert_eq!(once.page_id, "page@1");

    model.storage().render_cache().clear();
    assert_eq!(renderer.render().html, once.html);
}

#[tokio::test]
async fn test_resource_lookup_sees_only_earlier_captures() {
    let model = load().await;
    let storage = model.storage();
    let first = storage.snapshot_by_name("page@1", "before@call@1").unwrap();
    let second = storage.snapshot_by_name("page@1", "after@call@1").unwrap();

    assert!(first.resource_by_url("http://x/late.js", "GET").is_none());
    assert!(second.resource_by_url("http://x/late.js", "GET").is_some());
}

#[tokio::test]
async fn test_resource_lookup_prefers_same_frame_and_skips_not_modified() {
    let model = load().await;
    let second = model.storage().snapshot_by_name("page@1", "after@call@1").unwrap();

    let style = second.resource_by_url(STYLE_URL, "GET").unwrap();
    assert_eq!(style.response.status, 200);
    assert_eq!(style.response.content.sha1.as_deref(), Some("same-frame"));

    let image = second.resource_by_url("http://x/img.png", "GET").unwrap();
    assert_eq!(image.frame_ref.as_deref(), Some("frame@2"));

    assert!(second.resource_by_url(STYLE_URL, "POST").is_none());
}

#[tokio::test]
async fn test_resource_override_substitutes_body() {
    let model = load().await;
    let third = model.storage().snapshot_by_name("page@1", "before@call@2").unwrap();
    let style = third.resource_by_url(STYLE_URL, "GET").unwrap();
    assert_eq!(style.response.content.sha1.as_deref(), Some("override-sha"));
}

#[tokio::test]
async fn test_snapshots_are_listed_per_frame() {
    let model = load().await;
    let renderers = model.storage().renderers("frame@1");
    let names: Vec<&str> = renderers.iter().filter_map(|r| r.snapshot_name()).collect();
    assert_eq!(names, vec!["before@call@1", "after@call@1", "before@call@2", "broken"]);
    assert_eq!(model.storage().frame_ids(), vec!["frame@1", "page@1"]);
}

#[tokio::test]
async fn test_deeply_nested_snapshot_loads_and_renders() {
    let depth = 500;
    let mut html = json!("deep text");
    for _ in 0..depth {
        html = json!(["DIV", {}, html]);
    }
    let archive = ArchiveBuilder::new().log(
        "0.trace",
        &[
            context_options(7),
            frame_snapshot("shallow", 5.0, json!(["HTML", {}, "ok"])),
            frame_snapshot("deep", 10.0, html),
        ],
    );
    let model = TraceModel::load(archive.backend("deep.zip"), no_progress())
        .await
        .unwrap();
    let storage = model.storage();
    assert!(storage.snapshot_by_name("page@1", "shallow").is_some());
    let rendered = storage
        .snapshot_by_name("page@1", "deep")
        .unwrap()
        .render()
        .html;
    let expected = format!("{}deep text{}", "<DIV>".repeat(depth), "</DIV>".repeat(depth));
    assert_eq!(body(&rendered), expected);
}
