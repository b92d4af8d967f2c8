// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end command scenarios driven through the queue and executor
//! against the mock browser host.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use drover::adapter::AdapterOutcome;
use drover::command::{Command, CommandStatus, CommandVerb};
use drover::error::ErrorCode;
use drover::queue;
use drover::test_support::EngineBuilder;

const TIMEOUT: Duration = Duration::from_secs(5);

// A command for a host outside the allow-list is rejected, logged, and
// never queued.
#[tokio::test]
async fn domain_rejection_end_to_end() {
    let ctx = EngineBuilder::new()
        .tweak(|s| s.allowed_origins = vec!["etsy.com".to_owned()])
        .build();

    let command = Command::new("a", CommandVerb::OpenUrl, json!({"url": "https://example.com/"}));
    let result = queue::enqueue(&ctx.state, command).await;

    assert_eq!(result.status, CommandStatus::Rejected);
    assert_eq!(result.error, Some(ErrorCode::DomainNotAllowed));
    assert_eq!(ctx.state.queue.len(), 0);

    let logs = ctx.state.store.recent_logs(20);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].id, "a");
    assert_eq!(logs[0].status, CommandStatus::Rejected);
    assert_eq!(logs[0].error_code, Some(ErrorCode::DomainNotAllowed));
    assert_eq!(ctx.host.open_count(), 0, "rejected command must never execute");
}

// With a ceiling of 3, the fourth admission inside the window fails.
#[tokio::test]
async fn rate_limit_end_to_end() {
    let ctx = EngineBuilder::new().tweak(|s| s.max_commands_per_minute = 3).build();

    let mut statuses = Vec::new();
    for i in 0..4 {
        let command =
            Command::new(format!("w{i}"), CommandVerb::Wait, json!({"milliseconds": 1}));
        statuses.push(queue::enqueue(&ctx.state, command).await);
    }

    for status in &statuses[..3] {
        assert_eq!(status.status, CommandStatus::Queued);
    }
    assert_eq!(statuses[3].status, CommandStatus::Rejected);
    assert_eq!(statuses[3].error, Some(ErrorCode::RateLimited));
}

// Nested actions execute in order against one tab; extracted records
// stream to the sink; the parent completes.
#[tokio::test]
async fn nested_actions_end_to_end() {
    let mut ctx = EngineBuilder::new().build();
    ctx.adapter.set_extract(AdapterOutcome::ok(json!({
        "listings": [{"listingId": "7", "title": "Lamp", "url": "https://etsy.com/listing/7"}],
        "schemas": [],
    })));

    let command = Command::new(
        "b",
        CommandVerb::OpenUrl,
        json!({
            "url": "https://etsy.com/search?q=lamp",
            "actions": [
                {"type": "WAIT", "payload": {"milliseconds": 5}},
                {"type": "SCROLL_TO_BOTTOM", "payload": {}},
                {"type": "EXTRACT_SCHEMA", "payload": {}},
            ],
        }),
    );
    let result = queue::enqueue(&ctx.state, command).await;
    assert_eq!(result.status, CommandStatus::Queued);
    queue::drain(&ctx.state, &ctx.executor).await;

    assert_eq!(ctx.host.open_count(), 1);
    let logs = ctx.state.store.recent_logs(20);
    let ids: Vec<&str> = logs.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["b:0:WAIT", "b:1:SCROLL_TO_BOTTOM", "b:2:EXTRACT_SCHEMA", "b"]);
    let parent = &logs[3];
    assert_eq!(parent.status, CommandStatus::Completed);

    let streamed = ctx.drain_records();
    assert_eq!(streamed.len(), 1);
    assert_eq!(streamed[0]["listingId"], "7");
}

// Bodies captured during a WAIT survive into a later capture
// sub-action (no between-step wipe).
#[tokio::test]
async fn capture_additivity_end_to_end() -> anyhow::Result<()> {
    let ctx = EngineBuilder::new().build();
    ctx.host.set_body("r1", r#"{"n": 1}"#, false);
    ctx.host.set_body("r2", r#"{"n": 2}"#, false);

    let executor = Arc::clone(&ctx.executor);
    let command = Command::new(
        "cap",
        CommandVerb::OpenUrl,
        json!({
            "url": "https://etsy.com/search",
            "actions": [
                {"type": "WAIT", "payload": {"milliseconds": 400}},
                {"type": "CAPTURE_JSON_FROM_DEVTOOLS", "payload": {"waitForMs": 50}},
            ],
        }),
    );
    let task = tokio::spawn(async move { executor.execute(&command).await });

    // Inject two JSON responses while the WAIT is in flight. The probe is
    // live once the first injection is accepted.
    for rid in ["r1", "r2"] {
        let deadline = tokio::time::Instant::now() + TIMEOUT;
        loop {
            if ctx.host.inject_response(1, rid, "https://etsy.com/api/search", "application/json").await
            {
                break;
            }
            anyhow::ensure!(tokio::time::Instant::now() < deadline, "probe never attached");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    let result = task.await?;
    assert_eq!(result.status, CommandStatus::Completed);
    let records = result.records.unwrap_or_default();
    assert_eq!(records.len(), 2, "both bodies must survive into the capture step");
    for record in &records {
        assert_eq!(record["source"], "raw");
        assert_eq!(record["captureType"], "listings");
        assert!(record["json"]["n"].is_number());
    }
    Ok(())
}

// The search driver stops a term once the site reports an earlier
// active page, and exports exactly once at the end.
#[tokio::test]
async fn search_task_early_stop_end_to_end() {
    let mut ctx = EngineBuilder::new().build();
    ctx.adapter.push_active_page(Some(1));
    ctx.adapter.push_active_page(Some(1)); // page 2 answered with 1: stop

    let command = Command::new(
        "task",
        CommandVerb::ExecuteSearchTask,
        json!({"searchTerms": ["x"], "maxPages": 5, "actions": []}),
    );
    let result = queue::enqueue(&ctx.state, command).await;
    assert_eq!(result.status, CommandStatus::Queued);
    queue::drain(&ctx.state, &ctx.executor).await;

    assert_eq!(ctx.host.open_count(), 2, "driver must execute exactly two pages");
    assert!(ctx.state.sessions.is_empty().await);

    let exports = ctx
        .drain_records()
        .into_iter()
        .filter(|r| r["type"] == "exportSummary")
        .count();
    assert_eq!(exports, 1);
}

// Restarts surface recent history: a second engine over the same state
// directory sees the first engine's logs.
#[tokio::test]
async fn persisted_logs_survive_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    {
        let ctx = EngineBuilder::new().state_dir(dir.path().to_path_buf()).build();
        let command = Command::new("w", CommandVerb::Wait, json!({"milliseconds": 1}));
        let _ = queue::enqueue(&ctx.state, command).await;
        queue::drain(&ctx.state, &ctx.executor).await;
    }

    let ctx = EngineBuilder::new().state_dir(dir.path().to_path_buf()).build();
    let logs = ctx.state.store.recent_logs(20);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].id, "w");
    assert_eq!(logs[0].status, CommandStatus::Completed);
    Ok(())
}
