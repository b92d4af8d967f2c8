// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data streamer: write-only WebSocket client for the records sink.
//!
//! Each record is one JSON frame. While disconnected, records queue in an
//! outbox and flush FIFO on reconnect. Inbound frames are ignored.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::bridge::reconnect_delay;
use crate::state::EngineState;

/// The sink reconnects no faster than this, whatever the curve says.
pub const MIN_RECONNECT: Duration = Duration::from_secs(2);

/// Reconnect delay for the sink: the bridge curve with a 2 s floor.
pub fn sink_reconnect_delay(attempt: u32) -> Duration {
    reconnect_delay(attempt).max(MIN_RECONNECT)
}

/// Spawn the sink client. Runs until shutdown.
pub fn spawn(
    state: Arc<EngineState>,
    url: String,
    record_rx: mpsc::UnboundedReceiver<Value>,
) -> JoinHandle<()> {
    tokio::spawn(run(state, url, record_rx))
}

async fn run(state: Arc<EngineState>, url: String, mut record_rx: mpsc::UnboundedReceiver<Value>) {
    let mut outbox: VecDeque<String> = VecDeque::new();
    let mut attempt: u32 = 0;

    loop {
        if state.shutdown.is_cancelled() {
            break;
        }

        let connected = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            connected = tokio_tungstenite::connect_async(&url) => connected,
        };
        match connected {
            Ok((ws, _)) => {
                attempt = 0;
                info!(url = %url, "data sink connected");
                let (mut write, mut read) = ws.split();

                let mut send_failed = false;
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

                        record = record_rx.recv() => {
                            let Some(record) = record else { return };
                            let text = record.to_string();
                            if write.send(Message::Text(text.clone().into())).await.is_err() {
                                outbox.push_back(text);
                                break;
                            }
                        }

                        // Poll the read half only to notice closure; the
                        // sink never speaks to us.
                        msg = read.next() => {
                            match msg {
                                Some(Ok(Message::Close(_))) | None => {
                                    debug!("data sink closed by peer");
                                    break;
                                }
                                Some(Err(e)) => {
                                    debug!(err = %e, "data sink read error");
                                    break;
                                }
                                _ => {}
                            }
                        }
                    }
                }
            }
            Err(e) => {
                debug!(url = %url, err = %e, "data sink connect failed");
            }
        }

        attempt += 1;
        let deadline = tokio::time::Instant::now() + sink_reconnect_delay(attempt);
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => break,
                record = record_rx.recv() => {
                    match record {
                        Some(record) => outbox.push_back(record.to_string()),
                        None => return,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
