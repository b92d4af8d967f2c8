// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-bridge and data-streamer scenarios over real WebSocket listeners.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use drover::bridge::BridgeStatus;
use drover::command::{Command, CommandVerb};
use drover::state::EngineState;
use drover::test_support::{EngineBuilder, EngineCtx};
use drover::{bridge, queue, stream};
use drover_specs::WsServer;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Wait until the bridge observes the dropped connection.
async fn wait_disconnected(state: &EngineState) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while state.bridge_status() != BridgeStatus::Disconnected {
        anyhow::ensure!(
            tokio::time::Instant::now() < deadline,
            "bridge never noticed the close"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

// A command result emitted while disconnected arrives exactly once
// after reconnect, preceded by a state snapshot.
#[tokio::test]
async fn reconnect_preserves_events_in_order() -> anyhow::Result<()> {
    let server = WsServer::bind().await?;
    let EngineCtx { state, executor, frame_rx, .. } = EngineBuilder::new().build();
    let _ = bridge::spawn(Arc::clone(&state), Arc::clone(&executor), server.url(), frame_rx);

    let mut peer = server.accept(TIMEOUT).await?;
    let hello = peer.recv_json(TIMEOUT).await?;
    assert_eq!(hello["type"], "extensionState");
    peer.close().await;
    wait_disconnected(&state).await?;

    // Execute a WAIT to completion while the transport is down.
    let command = Command::new("w", CommandVerb::Wait, json!({"milliseconds": 1}));
    let admitted = queue::enqueue(&state, command).await;
    assert_eq!(admitted.status, drover::command::CommandStatus::Queued);
    queue::drain(&state, &executor).await;

    // Reconnect (backoff for attempt 1 is one second).
    let mut peer = server.accept(TIMEOUT).await?;
    let (before, result_frame) =
        peer.recv_until(TIMEOUT, |f| f["type"] == "commandResult").await?;
    assert_eq!(result_frame["commandId"], "w");
    assert_eq!(result_frame["result"]["status"], "completed");
    assert!(!before.is_empty(), "a state snapshot must precede the buffered result");
    assert!(before.iter().all(|f| f["type"] == "extensionState"));

    // Exactly once: no second commandResult follows.
    let second = peer.recv_until(Duration::from_millis(800), |f| f["type"] == "commandResult").await;
    assert!(second.is_err(), "commandResult delivered twice");
    Ok(())
}

// Every request envelope gets exactly one response bearing
// its requestId, even for unknown verbs and executor rejections.
#[tokio::test]
async fn every_request_is_answered() -> anyhow::Result<()> {
    let server = WsServer::bind().await?;
    let EngineCtx { state, executor, frame_rx, .. } = EngineBuilder::new().build();
    let _ = bridge::spawn(Arc::clone(&state), Arc::clone(&executor), server.url(), frame_rx);

    let mut peer = server.accept(TIMEOUT).await?;
    let _hello = peer.recv_json(TIMEOUT).await?;

    peer.send_json(&json!({
        "envelope": "agent-message",
        "requestId": "r1",
        "payload": {"type": "getExtensionState"},
    }))
    .await?;
    let (_, response) =
        peer.recv_until(TIMEOUT, |f| f["envelope"] == "extension-response").await?;
    assert_eq!(response["requestId"], "r1");
    assert_eq!(response["payload"]["queueLength"], 0);
    assert_eq!(response["payload"]["bridgeStatus"], "connected");

    // Unknown verbs are still answered, never silently dropped.
    peer.send_json(&json!({
        "envelope": "agent-message",
        "requestId": "r2",
        "payload": {"type": "selfDestruct"},
    }))
    .await?;
    let (_, response) =
        peer.recv_until(TIMEOUT, |f| f["envelope"] == "extension-response").await?;
    assert_eq!(response["requestId"], "r2");
    assert_eq!(response["payload"]["ok"], false);
    assert_eq!(response["payload"]["error"], "UNKNOWN_MESSAGE_TYPE");
    Ok(())
}

// Commands submitted over the bridge execute and announce their results.
#[tokio::test]
async fn enqueue_over_bridge_runs_to_completion() -> anyhow::Result<()> {
    let server = WsServer::bind().await?;
    let EngineCtx { state, executor, frame_rx, .. } = EngineBuilder::new().build();
    let _ = bridge::spawn(Arc::clone(&state), Arc::clone(&executor), server.url(), frame_rx);
    let _ = queue::spawn_drain(Arc::clone(&state), Arc::clone(&executor));

    let mut peer = server.accept(TIMEOUT).await?;
    let _hello = peer.recv_json(TIMEOUT).await?;

    peer.send_json(&json!({
        "envelope": "agent-message",
        "requestId": "q1",
        "payload": {
            "type": "enqueueCommand",
            "command": {"id": "job", "type": "WAIT", "payload": {"milliseconds": 10}},
        },
    }))
    .await?;

    let (_, response) =
        peer.recv_until(TIMEOUT, |f| f["envelope"] == "extension-response").await?;
    assert_eq!(response["requestId"], "q1");
    assert_eq!(response["payload"]["result"]["status"], "queued");

    let (_, result_frame) =
        peer.recv_until(TIMEOUT, |f| f["type"] == "commandResult").await?;
    assert_eq!(result_frame["commandId"], "job");
    assert_eq!(result_frame["result"]["status"], "completed");
    Ok(())
}

// toggleAgentControl over the bridge gates later admissions; the gated
// enqueue still receives a full response frame.
#[tokio::test]
async fn toggle_agent_control_over_bridge() -> anyhow::Result<()> {
    let server = WsServer::bind().await?;
    let EngineCtx { state, executor, frame_rx, .. } = EngineBuilder::new().build();
    let _ = bridge::spawn(Arc::clone(&state), Arc::clone(&executor), server.url(), frame_rx);

    let mut peer = server.accept(TIMEOUT).await?;
    let _hello = peer.recv_json(TIMEOUT).await?;

    peer.send_json(&json!({
        "envelope": "agent-message",
        "requestId": "t1",
        "payload": {"type": "toggleAgentControl", "enabled": false},
    }))
    .await?;
    let (_, response) =
        peer.recv_until(TIMEOUT, |f| f["envelope"] == "extension-response").await?;
    assert_eq!(response["payload"]["settings"]["agentControlEnabled"], false);

    peer.send_json(&json!({
        "envelope": "agent-message",
        "requestId": "t2",
        "payload": {
            "type": "enqueueCommand",
            "command": {"id": "x", "type": "WAIT", "payload": {}},
        },
    }))
    .await?;
    let (_, response) =
        peer.recv_until(TIMEOUT, |f| f["envelope"] == "extension-response").await?;
    assert_eq!(response["requestId"], "t2");
    assert_eq!(response["payload"]["result"]["status"], "rejected");
    assert_eq!(response["payload"]["result"]["error"], "AGENT_DISABLED");
    Ok(())
}

// Records emitted while the sink is disconnected flush FIFO
// on reconnect.
#[tokio::test]
async fn streamer_outbox_flushes_in_order() -> anyhow::Result<()> {
    let server = WsServer::bind().await?;
    let EngineCtx { state, record_rx, .. } = EngineBuilder::new().build();
    let _ = stream::spawn(Arc::clone(&state), server.url(), record_rx);

    let mut peer = server.accept(TIMEOUT).await?;
    state.stream_record(json!({"seq": 1}));
    let first = peer.recv_json(TIMEOUT).await?;
    assert_eq!(first["seq"], 1);
    peer.close().await;
    // Give the streamer a beat to observe the close before emitting.
    tokio::time::sleep(Duration::from_millis(300)).await;

    state.stream_record(json!({"seq": 2}));
    state.stream_record(json!({"seq": 3}));

    // The sink floor is two seconds; allow a little slack.
    let mut peer = server.accept(Duration::from_secs(8)).await?;
    let second = peer.recv_json(TIMEOUT).await?;
    let third = peer.recv_json(TIMEOUT).await?;
    assert_eq!(second["seq"], 2);
    assert_eq!(third["seq"], 3);
    Ok(())
}
