// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Search-task driver: iterates search terms and result pages, executing
//! one templated `OPEN_URL` per page and stopping a term early when the
//! site stops paging forward.

use rand::Rng;
use serde_json::json;
use tracing::{debug, info};

use crate::command::{Command, CommandResult, SubAction};
use crate::error::ErrorCode;
use crate::executor::Executor;

/// Placeholder-bearing search URL used when the task supplies none.
pub const DEFAULT_URL_TEMPLATE: &str =
    "https://www.etsy.com/search?q={searchTerm}&page={pageNumber}";

/// WAIT sub-actions are re-rolled into this range per page, so page loads
/// don't tick at a fixed cadence.
const JITTER_MIN_MS: u64 = 1500;
const JITTER_MAX_MS: u64 = 3000;

pub async fn run(exec: &Executor, command: &Command) -> CommandResult {
    let terms: Vec<String> = command
        .payload
        .get("searchTerms")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    if terms.is_empty() {
        return CommandResult::failed(ErrorCode::InvalidCommand);
    }

    let default_max_pages = exec.state.settings.read().await.max_pages_per_term;
    let max_pages = command
        .u64_field("maxPages")
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(default_max_pages)
        .max(1);
    let url_template =
        command.str_field("urlTemplate").unwrap_or(DEFAULT_URL_TEMPLATE).to_owned();
    let template_actions: Vec<SubAction> = command
        .payload
        .get("actions")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_else(default_actions);

    for (term_index, term) in terms.iter().enumerate() {
        info!(term = %term, "search term started");
        for page in 1..=max_pages {
            if exec.state.shutdown.is_cancelled() {
                break;
            }
            let url = render_template(&url_template, term, page);
            let child = Command {
                id: format!("{}:{}:{}", command.id, term_index, page),
                command_type: "OPEN_URL".to_owned(),
                payload: json!({"url": url, "actions": with_jitter(&template_actions)}),
                actions: None,
            };

            let result = Box::pin(exec.execute(&child)).await;
            exec.finalize_step(&child, &result).await;

            // The active page must be read while the tab is still alive;
            // cleanup below is unconditional, even for failed pages.
            let mut active_page = None;
            if let Some(tab) = result.tab_id {
                if result.is_completed() {
                    active_page = exec.adapter.active_page(tab).await;
                }
                exec.state.sessions.cleanup(tab, &exec.host, true).await;
            }

            if !result.is_completed() {
                debug!(term = %term, page, "page failed, stopping term");
                break;
            }
            if let Some(active) = active_page {
                if active < page {
                    // The site reset to an earlier page: no further results.
                    debug!(term = %term, page, active, "pagination exhausted");
                    break;
                }
            }
        }
    }

    let _ = exec.export_data().await;
    CommandResult::completed()
}

/// Substitute `{searchTerm}` (URL-encoded) and `{pageNumber}`.
fn render_template(template: &str, term: &str, page: u32) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(term.as_bytes()).collect();
    template.replace("{searchTerm}", &encoded).replace("{pageNumber}", &page.to_string())
}

fn default_actions() -> Vec<SubAction> {
    vec![
        SubAction { action_type: "WAIT".to_owned(), payload: json!({"milliseconds": 2000}) },
        SubAction { action_type: "SCROLL_TO_BOTTOM".to_owned(), payload: json!({}) },
        SubAction {
            action_type: "CAPTURE_JSON_FROM_DEVTOOLS".to_owned(),
            payload: json!({"captureType": "listings"}),
        },
    ]
}

/// Re-roll every WAIT's `milliseconds` into the jitter range.
fn with_jitter(actions: &[SubAction]) -> Vec<SubAction> {
    actions
        .iter()
        .cloned()
        .map(|mut action| {
            if action.action_type == "WAIT" {
                let ms = rand::rng().random_range(JITTER_MIN_MS..=JITTER_MAX_MS);
                if !action.payload.is_object() {
                    action.payload = json!({});
                }
                if let Some(obj) = action.payload.as_object_mut() {
                    obj.insert("milliseconds".to_owned(), json!(ms));
                }
            }
            action
        })
        .collect()
}

#[cfg(test)]
#[path = "search_tests.rs"]
mod tests;
