// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire frames exchanged with the agent: request/response envelopes and
//! fire-and-forget event frames.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::bridge::BridgeStatus;
use crate::command::CommandResult;
use crate::settings::Settings;
use crate::store::LogEntry;

/// Envelope tag on agent requests.
pub const AGENT_ENVELOPE: &str = "agent-message";
/// Envelope tag on engine responses.
pub const RESPONSE_ENVELOPE: &str = "extension-response";

/// A request from the agent. Every received envelope gets exactly one
/// response frame bearing the same `requestId`.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestEnvelope {
    pub envelope: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(default)]
    pub payload: Value,
}

/// Parse an inbound text frame as a request envelope, if it is one.
pub fn parse_request(text: &str) -> Option<RequestEnvelope> {
    let envelope: RequestEnvelope = serde_json::from_str(text).ok()?;
    (envelope.envelope == AGENT_ENVELOPE).then_some(envelope)
}

/// Serialize a response frame for a request.
pub fn response_frame(request_id: &str, payload: &Value) -> String {
    json!({
        "envelope": RESPONSE_ENVELOPE,
        "requestId": request_id,
        "payload": payload,
    })
    .to_string()
}

/// Snapshot of engine state pushed to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionState {
    pub settings: Settings,
    pub queue_length: usize,
    pub processing: bool,
    /// Most recent log entries, at most 20, oldest first.
    pub logs: Vec<LogEntry>,
    pub bridge_status: BridgeStatus,
}

/// Fire-and-forget event frames emitted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventFrame {
    #[serde(rename = "commandResult")]
    CommandResult {
        #[serde(rename = "commandId")]
        command_id: String,
        result: CommandResult,
    },
    #[serde(rename = "extensionState")]
    ExtensionState { payload: ExtensionState },
}

impl EventFrame {
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_owned())
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
