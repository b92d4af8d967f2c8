// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command model: the unit of work submitted by the agent, plus the
//! terminal result shape returned for it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;

/// The enumerated automation verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandVerb {
    OpenUrl,
    Wait,
    ScrollToBottom,
    Click,
    CaptureJsonFromDevtools,
    ExtractSchema,
    ExecuteSearchTask,
}

impl CommandVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenUrl => "OPEN_URL",
            Self::Wait => "WAIT",
            Self::ScrollToBottom => "SCROLL_TO_BOTTOM",
            Self::Click => "CLICK",
            Self::CaptureJsonFromDevtools => "CAPTURE_JSON_FROM_DEVTOOLS",
            Self::ExtractSchema => "EXTRACT_SCHEMA",
            Self::ExecuteSearchTask => "EXECUTE_SEARCH_TASK",
        }
    }

    /// Parse a wire verb. Unknown verbs are rejected at admission with
    /// `INVALID_COMMAND`, so this returns `Option` rather than erroring.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN_URL" => Some(Self::OpenUrl),
            "WAIT" => Some(Self::Wait),
            "SCROLL_TO_BOTTOM" => Some(Self::ScrollToBottom),
            "CLICK" => Some(Self::Click),
            "CAPTURE_JSON_FROM_DEVTOOLS" => Some(Self::CaptureJsonFromDevtools),
            "EXTRACT_SCHEMA" => Some(Self::ExtractSchema),
            "EXECUTE_SEARCH_TASK" => Some(Self::ExecuteSearchTask),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommandVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command-like entry inside another command's `actions` list. Executes
/// against the parent's tab and bypasses the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub payload: Value,
}

/// A unit of work submitted by the agent.
///
/// The verb travels as a raw string so that unknown verbs surface as an
/// admission failure instead of a deserialization error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub command_type: String,
    #[serde(default)]
    pub payload: Value,
    /// Top-level `actions` is the legacy location; `payload.actions` wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<SubAction>>,
}

impl Command {
    pub fn new(id: impl Into<String>, verb: CommandVerb, payload: Value) -> Self {
        Self { id: id.into(), command_type: verb.as_str().to_owned(), payload, actions: None }
    }

    pub fn verb(&self) -> Option<CommandVerb> {
        CommandVerb::parse(&self.command_type)
    }

    /// Sub-actions: `payload.actions` preferred, top-level `actions` as a
    /// fallback.
    pub fn sub_actions(&self) -> Vec<SubAction> {
        if let Some(list) = self.payload.get("actions") {
            if let Ok(actions) = serde_json::from_value::<Vec<SubAction>>(list.clone()) {
                return actions;
            }
        }
        self.actions.clone().unwrap_or_default()
    }

    pub fn url(&self) -> Option<&str> {
        self.payload.get("url").and_then(Value::as_str)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn u64_field(&self, key: &str) -> Option<u64> {
        self.payload.get(key).and_then(Value::as_u64)
    }

    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.payload.get(key).and_then(Value::as_bool)
    }

    pub fn tab_id(&self) -> Option<u64> {
        self.u64_field("tabId")
    }
}

/// Terminal disposition of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Queued,
    Rejected,
    Completed,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Result of admitting or executing a command. Handler-specific fields are
/// optional and skipped when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_streamed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_listings_found: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResult {
    fn bare(status: CommandStatus) -> Self {
        Self {
            status,
            error: None,
            tab_id: None,
            records: None,
            items_streamed: None,
            total_listings_found: None,
            rejected_count: None,
            schema_count: None,
            data: None,
        }
    }

    pub fn queued() -> Self {
        Self::bare(CommandStatus::Queued)
    }

    pub fn rejected(error: ErrorCode) -> Self {
        Self { error: Some(error), ..Self::bare(CommandStatus::Rejected) }
    }

    pub fn completed() -> Self {
        Self::bare(CommandStatus::Completed)
    }

    pub fn failed(error: ErrorCode) -> Self {
        Self { error: Some(error), ..Self::bare(CommandStatus::Failed) }
    }

    pub fn with_tab(mut self, tab_id: u64) -> Self {
        self.tab_id = Some(tab_id);
        self
    }

    pub fn with_records(mut self, records: Vec<Value>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == CommandStatus::Completed
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
