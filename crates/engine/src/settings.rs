// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Runtime-mutable engine settings.
///
/// Loaded from the state directory on startup, mutated only through
/// `toggleAgentControl` or an external edit of the persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Master switch: when false, no new commands are admitted.
    pub agent_control_enabled: bool,
    /// Origin patterns a command URL must match (`domain` or `*.domain`).
    pub allowed_origins: Vec<String>,
    pub max_commands_per_minute: u32,
    pub max_concurrent_tabs: usize,
    /// Captured response bodies larger than this are skipped at parse time.
    pub max_response_body_bytes: usize,
    /// Host substring a captured response URL must contain to be buffered.
    pub capture_host_filter: String,
    pub max_pages_per_term: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            agent_control_enabled: true,
            allowed_origins: vec!["etsy.com".to_owned(), "*.etsy.com".to_owned()],
            max_commands_per_minute: 10,
            max_concurrent_tabs: 3,
            max_response_body_bytes: 2_000_000,
            capture_host_filter: "etsy.com".to_owned(),
            max_pages_per_term: 5,
        }
    }
}

impl Settings {
    /// Enforce the documented floors. Applied after every load and mutation
    /// so a hand-edited settings file cannot wedge the engine.
    pub fn clamp(&mut self) {
        self.max_commands_per_minute = self.max_commands_per_minute.max(1);
        self.max_concurrent_tabs = self.max_concurrent_tabs.max(1);
        self.max_response_body_bytes = self.max_response_body_bytes.max(1);
        self.max_pages_per_term = self.max_pages_per_term.max(1);
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
