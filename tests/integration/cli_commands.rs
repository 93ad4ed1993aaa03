use super::support::{after, before, context_options, frame_snapshot, resource, ArchiveBuilder};
use clap::Parser;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;
use tracescope::tooling::{Cli, CliContext};

fn write_trace(dir: &Path) -> String {
    let mut failed = after("call@2", 50.0);
    failed["error"] = json!({"message": "element not found"});
    ArchiveBuilder::new()
        .log(
            "0.trace",
            &[
                context_options(7),
                before("call@1", "page.goto", 10.0, 1010.0),
                after("call@1", 30.0),
                before("call@2", "page.click", 35.0, 1035.0),
                failed,
                frame_snapshot("after@call@1", 30.0, json!(["HTML", {}, ["BODY", {}, "ready"]])),
            ],
        )
        .log(
            "0.network",
            &[resource("http://x/style.css", "frame@1", 200, Some("css-sha"), 5.0)],
        )
        .entry("resources/css-sha", "p{}")
        .write_to(dir, "trace.zip")
        .to_string_lossy()
        .to_string()
}

async fn run(args: &[&str]) -> String {
    let cli = Cli::try_parse_from(args).unwrap();
    let context = CliContext::new(&cli).unwrap();
    context.execute(&cli.command).await.unwrap()
}

#[tokio::test]
async fn test_info_and_actions() {
    let dir = TempDir::new().unwrap();
    let trace = write_trace(dir.path());

    let info = run(&["tracescope", "info", trace.as_str()]).await;
    assert!(info.contains("chromium"));
    assert!(info.contains("element not found"));

    let actions = run(&["tracescope", "actions", trace.as_str()]).await;
    assert!(actions.contains("page.goto"));
    assert!(actions.contains("page.click"));
}

#[tokio::test]
async fn test_render_writes_document() {
    let dir = TempDir::new().unwrap();
    let trace = write_trace(dir.path());
    let output = dir.path().join("snapshot.html");
    let output_arg = output.to_string_lossy().to_string();

    let message = run(&[
        "tracescope",
        "render",
        trace.as_str(),
        "page@1",
        "after@call@1",
        "--output",
        output_arg.as_str(),
    ])
    .await;
    assert!(message.starts_with("Wrote"));

    let html = std::fs::read_to_string(&output).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.ends_with("<HTML><BODY>ready</BODY></HTML>"));
}

#[tokio::test]
async fn test_resource_extraction() {
    let dir = TempDir::new().unwrap();
    let trace = write_trace(dir.path());

    let summary = run(&["tracescope", "resource", trace.as_str(), "css-sha"]).await;
    assert_eq!(summary, "css-sha: 3 bytes, text/css");

    let cli = Cli::try_parse_from(["tracescope", "resource", trace.as_str(), "nope"]).unwrap();
    let context = CliContext::new(&cli).unwrap();
    assert!(context.execute(&cli.command).await.is_err());
}

#[tokio::test]
async fn test_unknown_snapshot_is_an_error() {
    let dir = TempDir::new().unwrap();
    let trace = write_trace(dir.path());
    let cli = Cli::try_parse_from(["tracescope", "render", trace.as_str(), "page@1", "missing"]).unwrap();
    let context = CliContext::new(&cli).unwrap();
    assert!(context.execute(&cli.command).await.is_err());
}
