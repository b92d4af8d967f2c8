// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command executor: dispatches a command by verb to its handler.
//!
//! Handlers may recursively execute nested sub-actions; all of a parent's
//! sub-actions share the parent's tab and bypass the queue. Every terminal
//! step (parent or sub-action) is persisted, logged, and announced with a
//! `commandResult` event.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::adapter::ContentAdapter;
use crate::browser::{BrowserHost, TabId};
use crate::command::{Command, CommandResult, CommandVerb};
use crate::error::ErrorCode;
use crate::frame::EventFrame;
use crate::probe;
use crate::search;
use crate::session::CaptureKind;
use crate::state::EngineState;
use crate::store::{LogEntry, ResultSummary};

/// Tab load deadline before a command fails with `NAVIGATION_TIMEOUT`.
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_WAIT_MS: u64 = 1000;
const DEFAULT_CAPTURE_WAIT_MS: u64 = 5000;
const DEFAULT_SCROLL_STEP: u64 = 1000;
const DEFAULT_SCROLL_DELAY_MS: u64 = 400;
const DEFAULT_SCROLL_ITERATIONS: u64 = 10;
const DEFAULT_CLICK_TIMES: u64 = 1;
const DEFAULT_CLICK_DELAY_MS: u64 = 500;

/// Aggregated outcome of a parent's sub-action run.
#[derive(Debug, Default)]
pub struct SubOutcome {
    pub ran: usize,
    pub completed: usize,
    pub records: Vec<Value>,
    pub first_error: Option<ErrorCode>,
}

/// Dispatches commands against the browser host and content adapter.
pub struct Executor {
    pub state: Arc<EngineState>,
    pub host: Arc<dyn BrowserHost>,
    pub adapter: Arc<dyn ContentAdapter>,
}

impl Executor {
    pub fn new(
        state: Arc<EngineState>,
        host: Arc<dyn BrowserHost>,
        adapter: Arc<dyn ContentAdapter>,
    ) -> Self {
        Self { state, host, adapter }
    }

    /// Execute a command to its terminal result. Never panics; failures
    /// become `{status: failed, error}`.
    pub async fn execute(&self, command: &Command) -> CommandResult {
        let Some(verb) = command.verb() else {
            return CommandResult::failed(ErrorCode::InvalidCommand);
        };
        match verb {
            CommandVerb::OpenUrl => self.open_url(command).await,
            CommandVerb::Wait => self.wait(command).await,
            CommandVerb::ScrollToBottom => self.scroll_to_bottom(command).await,
            CommandVerb::Click => self.click(command).await,
            CommandVerb::CaptureJsonFromDevtools => self.capture_json(command).await,
            CommandVerb::ExtractSchema => self.extract_schema(command).await,
            CommandVerb::ExecuteSearchTask => search::run(self, command).await,
        }
    }

    /// Persist the result summary and log entry for a terminal step and
    /// emit its `commandResult` event.
    pub async fn finalize_step(&self, command: &Command, result: &CommandResult) {
        self.state.store.record_result(&command.id, ResultSummary::for_step(command, result));
        self.state.store.append_log(LogEntry::for_step(command, result));
        self.state.emit(EventFrame::CommandResult {
            command_id: command.id.clone(),
            result: result.clone(),
        });
    }

    async fn open_url(&self, command: &Command) -> CommandResult {
        let Some(url) = command.url() else {
            return CommandResult::failed(ErrorCode::InvalidCommand);
        };
        let (max_tabs, host_filter) = {
            let settings = self.state.settings.read().await;
            (settings.max_concurrent_tabs, settings.capture_host_filter.clone())
        };

        self.state.sessions.reserve_slot(max_tabs, &self.state.shutdown).await;
        if self.state.shutdown.is_cancelled() {
            return CommandResult::failed(ErrorCode::UnknownError);
        }

        let tab = match self.host.open_tab(url, false).await {
            Ok(tab) => tab,
            Err(e) => {
                warn!(url, err = %e, "tab open failed");
                return CommandResult::failed(ErrorCode::Other(e.to_string()));
            }
        };

        match tokio::time::timeout(NAVIGATION_TIMEOUT, self.host.wait_for_load(tab)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(tab, url, err = %e, "load wait failed");
                let _ = self.host.close_tab(tab).await;
                return CommandResult::failed(ErrorCode::Other(e.to_string())).with_tab(tab);
            }
            Err(_) => {
                let _ = self.host.close_tab(tab).await;
                return CommandResult::failed(ErrorCode::NavigationTimeout).with_tab(tab);
            }
        }

        let events = match self.host.attach(tab).await {
            Ok(events) => events,
            Err(e) => {
                warn!(tab, err = %e, "probe attach failed");
                let _ = self.host.close_tab(tab).await;
                return CommandResult::failed(ErrorCode::AttachFailed).with_tab(tab);
            }
        };
        let probe_token = self.state.sessions.open(tab, &command.id).await;
        let _ = probe::spawn(
            Arc::clone(&self.host),
            Arc::clone(&self.state.sessions),
            tab,
            host_filter,
            probe_token,
            events,
        );

        let sub = self.run_sub_actions(command, Some(tab)).await;
        if sub.ran > 0 && sub.completed == 0 && sub.records.is_empty() {
            let code = sub.first_error.unwrap_or(ErrorCode::UnknownError);
            return CommandResult::failed(code).with_tab(tab);
        }
        let mut result = CommandResult::completed().with_tab(tab);
        if !sub.records.is_empty() {
            result = result.with_records(sub.records);
        }
        result
    }

    /// Run each sub-action in order against the parent's tab.
    ///
    /// A failing sub-action does not stop the remainder; the aggregate
    /// tells the parent whether anything succeeded.
    pub async fn run_sub_actions(&self, parent: &Command, tab: Option<TabId>) -> SubOutcome {
        let mut outcome = SubOutcome::default();
        for (index, action) in parent.sub_actions().into_iter().enumerate() {
            let mut payload = action.payload.clone();
            if !payload.is_object() {
                payload = json!({});
            }
            if let (Some(tab), Some(obj)) = (tab, payload.as_object_mut()) {
                obj.insert("tabId".to_owned(), json!(tab));
            }
            let child = Command {
                id: format!("{}:{}:{}", parent.id, index, action.action_type),
                command_type: action.action_type.clone(),
                payload,
                actions: None,
            };

            let result = Box::pin(self.execute(&child)).await;
            self.finalize_step(&child, &result).await;

            outcome.ran += 1;
            if result.is_completed() {
                outcome.completed += 1;
            } else if outcome.first_error.is_none() {
                outcome.first_error = result.error.clone();
            }
            if let Some(records) = result.records {
                outcome.records.extend(records);
            }
        }
        outcome
    }

    async fn wait(&self, command: &Command) -> CommandResult {
        let ms = command.u64_field("milliseconds").unwrap_or(DEFAULT_WAIT_MS);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        CommandResult::completed()
    }

    async fn scroll_to_bottom(&self, command: &Command) -> CommandResult {
        let Some(tab) = command.tab_id() else {
            return CommandResult::failed(ErrorCode::InvalidCommand);
        };
        let step = command.u64_field("step").unwrap_or(DEFAULT_SCROLL_STEP);
        let delay = command.u64_field("delay").unwrap_or(DEFAULT_SCROLL_DELAY_MS);
        let max_iterations =
            command.u64_field("maxIterations").unwrap_or(DEFAULT_SCROLL_ITERATIONS);

        let outcome = self.adapter.scroll_to_bottom(tab, step, delay, max_iterations).await;
        if outcome.ok {
            CommandResult::completed().with_data(outcome.data.unwrap_or(Value::Null))
        } else {
            debug!(tab, error = ?outcome.error, "scroll failed");
            CommandResult::failed(ErrorCode::ContentScriptError)
        }
    }

    async fn click(&self, command: &Command) -> CommandResult {
        let Some(tab) = command.tab_id() else {
            return CommandResult::failed(ErrorCode::InvalidCommand);
        };
        let Some(selector) = command.str_field("selector") else {
            return CommandResult::failed(ErrorCode::MissingSelector);
        };
        let max_times = command.u64_field("maxTimes").unwrap_or(DEFAULT_CLICK_TIMES);
        let delay = command.u64_field("delay").unwrap_or(DEFAULT_CLICK_DELAY_MS);

        let outcome = self.adapter.click(tab, selector, max_times, delay).await;
        if outcome.ok {
            CommandResult::completed().with_data(outcome.data.unwrap_or(Value::Null))
        } else if outcome.error.as_deref() == Some("element_not_found") {
            CommandResult::failed(ErrorCode::ElementNotFound)
        } else {
            debug!(tab, selector, error = ?outcome.error, "click failed");
            CommandResult::failed(ErrorCode::ContentScriptError)
        }
    }

    async fn capture_json(&self, command: &Command) -> CommandResult {
        let Some(tab) = command.tab_id() else {
            return CommandResult::failed(ErrorCode::InvalidCommand);
        };
        let mode = match command.str_field("captureType") {
            None => CaptureKind::Listings,
            Some(raw) => match CaptureKind::parse(raw) {
                Some(kind) => kind,
                None => return CommandResult::failed(ErrorCode::InvalidCommand),
            },
        };
        // Mode changes never wipe bodies buffered by earlier steps.
        if !self.state.sessions.set_capture_mode(tab, mode).await {
            return CommandResult::failed(ErrorCode::InvalidCommand);
        }

        let wait_ms = command.u64_field("waitForMs").unwrap_or(DEFAULT_CAPTURE_WAIT_MS);
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;

        let max_bytes = self.state.settings.read().await.max_response_body_bytes;
        let (mode, bodies) =
            self.state.sessions.captured(tab).await.unwrap_or((mode, Vec::new()));

        let mut records = Vec::new();
        let mut parse_failures = 0usize;
        for body in &bodies {
            if body.raw.len() > max_bytes {
                continue;
            }
            match serde_json::from_str::<Value>(&body.raw) {
                Ok(parsed) => records.push(json!({
                    "source": "raw",
                    "url": body.url,
                    "captureType": mode.as_str(),
                    "json": parsed,
                })),
                Err(_) => parse_failures += 1,
            }
        }
        if parse_failures > 0 {
            debug!(tab, parse_failures, "captured bodies failed to parse");
        }

        let close_tab = command.bool_field("closeTab").unwrap_or(true);
        self.state.sessions.cleanup(tab, &self.host, close_tab).await;

        CommandResult::completed().with_records(records)
    }

    async fn extract_schema(&self, command: &Command) -> CommandResult {
        let Some(tab) = command.tab_id() else {
            return CommandResult::failed(ErrorCode::InvalidCommand);
        };
        let types: Vec<String> = command
            .payload
            .get("types")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let outcome = self.adapter.extract(tab, &types).await;
        if !outcome.ok {
            debug!(tab, error = ?outcome.error, "extraction failed");
            return CommandResult::failed(ErrorCode::ContentScriptError);
        }
        let data = outcome.data.unwrap_or(Value::Null);
        let listings = data
            .get("listings")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let schema_count =
            data.get("schemas").and_then(Value::as_array).map_or(0, Vec::len) as u64;

        let mut streamed = 0u64;
        let mut rejected = 0u64;
        for listing in &listings {
            match crate::extract::validate_listing(listing) {
                Ok(()) => {
                    self.state.stream_record(listing.clone());
                    streamed += 1;
                }
                Err(reason) => {
                    debug!(tab, %reason, "listing rejected by schema");
                    rejected += 1;
                }
            }
        }

        let mut result = CommandResult::completed();
        result.items_streamed = Some(streamed);
        result.total_listings_found = Some(listings.len() as u64);
        result.rejected_count = Some(rejected);
        result.schema_count = Some(schema_count);
        result
    }

    /// Export operation: the sink is live-streaming, so this emits a
    /// summary record and reports how much has been streamed.
    pub async fn export_data(&self) -> Value {
        let streamed = self.state.records_streamed.load(std::sync::atomic::Ordering::Relaxed);
        self.state.stream_record(json!({
            "type": "exportSummary",
            "itemsStreamed": streamed,
            "exportedAt": chrono::Utc::now().to_rfc3339(),
        }));
        json!({
            "ok": true,
            "message": format!("sink is live-streaming; {streamed} records streamed since startup"),
        })
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
