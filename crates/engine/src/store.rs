// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable log/result store.
//!
//! A bounded append-only ring of executed command entries plus a keyed map
//! of per-command result summaries, persisted as JSON documents in the
//! state directory after each terminal step. Persistence is best-effort:
//! IO failures are logged and never fail a command.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::command::{Command, CommandResult, CommandStatus};
use crate::error::ErrorCode;
use crate::settings::Settings;

/// Oldest log entries are dropped beyond this bound.
pub const MAX_LOG_ENTRIES: usize = 200;

const SETTINGS_FILE: &str = "settings.json";
const LOGS_FILE: &str = "logs.json";
const RESULTS_FILE: &str = "results.json";

/// One executed (or rejected) command step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub command_type: String,
    pub status: CommandStatus,
    #[serde(rename = "errorCode", default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// ISO-8601 timestamp.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl LogEntry {
    pub fn for_step(command: &Command, result: &CommandResult) -> Self {
        Self {
            id: command.id.clone(),
            command_type: command.command_type.clone(),
            status: result.status,
            error_code: result.error.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            url: command.url().map(str::to_owned),
        }
    }
}

/// Per-command result summary kept in the keyed result map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub command_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_streamed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,
}

impl ResultSummary {
    pub fn for_step(command: &Command, result: &CommandResult) -> Self {
        Self {
            status: result.status,
            error_code: result.error.clone(),
            command_type: command.command_type.clone(),
            items_streamed: result.items_streamed,
            record_count: result.records.as_ref().map(|r| r.len() as u64),
        }
    }
}

/// File-backed store for settings, logs, and result summaries.
///
/// With no state directory (tests), everything stays in memory.
pub struct StateStore {
    dir: Option<PathBuf>,
    logs: Mutex<VecDeque<LogEntry>>,
    results: Mutex<HashMap<String, ResultSummary>>,
}

impl StateStore {
    /// Open the store, restoring any persisted logs and results.
    pub fn open(dir: Option<PathBuf>) -> Self {
        if let Some(ref dir) = dir {
            let _ = std::fs::create_dir_all(dir);
        }
        let logs = dir
            .as_deref()
            .and_then(|d| read_json::<Vec<LogEntry>>(&d.join(LOGS_FILE)))
            .unwrap_or_default();
        let results = dir
            .as_deref()
            .and_then(|d| read_json::<HashMap<String, ResultSummary>>(&d.join(RESULTS_FILE)))
            .unwrap_or_default();

        let mut logs: VecDeque<LogEntry> = logs.into();
        while logs.len() > MAX_LOG_ENTRIES {
            logs.pop_front();
        }

        Self { dir, logs: Mutex::new(logs), results: Mutex::new(results) }
    }

    /// Load the persisted settings document, if any.
    pub fn load_settings(&self) -> Option<Settings> {
        let dir = self.dir.as_deref()?;
        let mut settings: Settings = read_json(&dir.join(SETTINGS_FILE))?;
        settings.clamp();
        Some(settings)
    }

    pub fn persist_settings(&self, settings: &Settings) {
        if let Some(ref dir) = self.dir {
            write_json(&dir.join(SETTINGS_FILE), settings);
        }
    }

    /// Append a log entry, dropping the oldest beyond the bound, and
    /// persist the ring.
    pub fn append_log(&self, entry: LogEntry) {
        let snapshot: Vec<LogEntry> = {
            let mut logs = self.logs.lock();
            logs.push_back(entry);
            while logs.len() > MAX_LOG_ENTRIES {
                logs.pop_front();
            }
            logs.iter().cloned().collect()
        };
        if let Some(ref dir) = self.dir {
            write_json(&dir.join(LOGS_FILE), &snapshot);
        }
    }

    /// Record (or overwrite) the result summary for a command id.
    pub fn record_result(&self, id: &str, summary: ResultSummary) {
        let snapshot: HashMap<String, ResultSummary> = {
            let mut results = self.results.lock();
            results.insert(id.to_owned(), summary);
            results.clone()
        };
        if let Some(ref dir) = self.dir {
            write_json(&dir.join(RESULTS_FILE), &snapshot);
        }
    }

    /// Most recent `n` log entries, oldest first.
    pub fn recent_logs(&self, n: usize) -> Vec<LogEntry> {
        let logs = self.logs.lock();
        let skip = logs.len().saturating_sub(n);
        logs.iter().skip(skip).cloned().collect()
    }

    pub fn log_len(&self) -> usize {
        self.logs.lock().len()
    }

    pub fn result(&self, id: &str) -> Option<ResultSummary> {
        self.results.lock().get(id).cloned()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), err = %e, "discarding unreadable state file");
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) {
    let Ok(contents) = serde_json::to_string(value) else {
        return;
    };
    if let Err(e) = std::fs::write(path, contents) {
        warn!(path = %path.display(), err = %e, "state persistence failed");
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
