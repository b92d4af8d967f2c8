// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Debug probe: consumes a tab's response-event stream and buffers the
//! bodies of interesting JSON responses into the owning session.
//!
//! Capture is additive across command steps: navigation, scrolls, and
//! waits all feed the same buffer, which is only dropped when the session
//! is destroyed.

use std::sync::Arc;

use base64::Engine as _;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::browser::{BrowserHost, ResponseEvent, TabId};
use crate::session::{CapturedBody, TabSessions};

/// Interest filter: JSON mime type and a host-policy URL substring.
pub fn interesting(event: &ResponseEvent, host_filter: &str) -> bool {
    event.mime_type.contains("json") && event.url.contains(host_filter)
}

/// Spawn the capture task for an attached tab.
///
/// Runs until the event stream ends or the session token is cancelled.
/// Body-fetch failures are logged and skipped.
pub fn spawn(
    host: Arc<dyn BrowserHost>,
    sessions: Arc<TabSessions>,
    tab: TabId,
    host_filter: String,
    cancel: CancellationToken,
    mut events: mpsc::Receiver<ResponseEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if !interesting(&event, &host_filter) {
                continue;
            }
            let raw = match host.fetch_body(tab, &event.request_id).await {
                Ok(body) => decode_body(body.body, body.base64_encoded),
                Err(e) => {
                    debug!(tab, url = %event.url, err = %e, "response body fetch failed");
                    continue;
                }
            };
            if !sessions.push_body(tab, CapturedBody { url: event.url, raw }).await {
                // Session already destroyed; stop capturing.
                break;
            }
        }
    })
}

/// Undo base64 transport encoding when the protocol flags it.
fn decode_body(body: String, base64_encoded: bool) -> String {
    if !base64_encoded {
        return body;
    }
    match base64::engine::general_purpose::STANDARD.decode(&body) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => body,
    }
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
