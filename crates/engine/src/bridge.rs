// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent bridge: outbound WebSocket client with auto-reconnect and an
//! outbox that preserves frames while disconnected.
//!
//! Two frame kinds flow here: request envelopes (dispatched into the
//! control surface, always answered with exactly one response frame) and
//! fire-and-forget event frames emitted by the core.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::command::Command;
use crate::error::ErrorCode;
use crate::executor::Executor;
use crate::frame::{self, EventFrame};
use crate::queue;
use crate::state::EngineState;

/// Connection state shown in the extension-state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl BridgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Reconnect delay for attempt `k` (1-based): `min(15s, 1s · min(k,5)²)`.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let k = u64::from(attempt.min(5));
    Duration::from_millis((1000 * k * k).min(15_000))
}

/// Dispatch one control-surface request and build its response payload.
pub async fn dispatch_control(state: &EngineState, executor: &Executor, payload: &Value) -> Value {
    match payload.get("type").and_then(Value::as_str) {
        Some("enqueueCommand") => {
            let command = payload
                .get("command")
                .and_then(|v| serde_json::from_value::<Command>(v.clone()).ok());
            let Some(command) = command else {
                return json!({"ok": false, "error": ErrorCode::InvalidCommand});
            };
            let result = queue::enqueue(state, command).await;
            json!({"ok": true, "result": result})
        }
        Some("getExtensionState") => {
            serde_json::to_value(state.snapshot().await).unwrap_or_else(|_| json!({}))
        }
        Some("toggleAgentControl") => {
            let Some(enabled) = payload.get("enabled").and_then(Value::as_bool) else {
                return json!({"ok": false, "error": ErrorCode::InvalidCommand});
            };
            let settings = state.toggle_agent_control(enabled).await;
            json!({"ok": true, "settings": settings})
        }
        Some("exportData") => executor.export_data().await,
        _ => json!({"ok": false, "error": ErrorCode::UnknownMessageType}),
    }
}

/// Spawn the bridge client. Runs until shutdown.
pub fn spawn(
    state: Arc<EngineState>,
    executor: Arc<Executor>,
    url: String,
    frame_rx: mpsc::UnboundedReceiver<EventFrame>,
) -> JoinHandle<()> {
    tokio::spawn(run(state, executor, url, frame_rx))
}

async fn run(
    state: Arc<EngineState>,
    executor: Arc<Executor>,
    url: String,
    mut frame_rx: mpsc::UnboundedReceiver<EventFrame>,
) {
    let mut outbox: VecDeque<String> = VecDeque::new();
    let mut attempt: u32 = 0;

    loop {
        if state.shutdown.is_cancelled() {
            break;
        }
        state.set_bridge_status(BridgeStatus::Connecting);

        let connected = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            connected = tokio_tungstenite::connect_async(&url) => connected,
        };
        match connected {
            Ok((ws, _)) => {
                attempt = 0;
                state.set_bridge_status(BridgeStatus::Connected);
                info!(url = %url, "agent bridge connected");
                let (mut write, mut read) = ws.split();

                // Fresh snapshot first, then the buffered frames in FIFO
                // order, then live traffic.
                let snapshot = EventFrame::ExtensionState { payload: state.snapshot().await };
                let mut send_failed =
                    write.send(Message::Text(snapshot.to_text().into())).await.is_err();
                while !send_failed {
                    let Some(text) = outbox.pop_front() else { break };
                    if write.send(Message::Text(text.clone().into())).await.is_err() {
                        outbox.push_front(text);
                        send_failed = true;
                    }
                }

                while !send_failed {
                    tokio::select! {
                        _ = state.shutdown.cancelled() => {
                            let _ = write.send(Message::Close(None)).await;
                            return;
                        }

                        frame = frame_rx.recv() => {
                            let Some(frame) = frame else { return };
                            let text = frame.to_text();
                            if write.send(Message::Text(text.clone().into())).await.is_err() {
                                outbox.push_back(text);
                                break;
                            }
                        }

                        msg = read.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    let Some(request) = frame::parse_request(&text) else {
                                        continue;
                                    };
                                    let payload =
                                        dispatch_control(&state, &executor, &request.payload).await;
                                    let response =
                                        frame::response_frame(&request.request_id, &payload);
                                    // A response racing a disconnect goes to the
                                    // outbox: exactly one response per request.
                                    if write
                                        .send(Message::Text(response.clone().into()))
                                        .await
                                        .is_err()
                                    {
                                        outbox.push_back(response);
                                        break;
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => {
                                    debug!("agent bridge closed by peer");
                                    break;
                                }
                                Some(Err(e)) => {
                                    debug!(err = %e, "agent bridge read error");
                                    break;
                                }
                                _ => {} // ping/pong/binary ignored
                            }
                        }
                    }
                }
            }
            Err(e) => {
                debug!(url = %url, err = %e, "agent bridge connect failed");
            }
        }

        state.set_bridge_status(BridgeStatus::Disconnected);
        attempt += 1;
        let deadline = tokio::time::Instant::now() + reconnect_delay(attempt);

        // Keep draining event emissions into the outbox while backing off
        // so nothing is dropped or reordered.
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => break,
                frame = frame_rx.recv() => {
                    match frame {
                        Some(frame) => outbox.push_back(frame.to_text()),
                        None => return,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
