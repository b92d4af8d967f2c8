// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Browser-automation command engine.
#[derive(Debug, Parser)]
#[command(name = "drover", version, about)]
pub struct Config {
    /// Agent transport endpoint.
    #[arg(long, env = "DROVER_AGENT_URL", default_value = "ws://localhost:8000/ws/extension")]
    pub agent_url: String,

    /// Records sink endpoint.
    #[arg(long, env = "DROVER_DATA_URL", default_value = "ws://localhost:8000/ws/data")]
    pub data_url: String,

    /// Browser DevTools HTTP endpoint.
    #[arg(long, env = "DROVER_BROWSER_URL", default_value = "http://127.0.0.1:9222")]
    pub browser_url: String,

    /// Directory for persisted settings, logs, and results. In-memory
    /// when unset.
    #[arg(long, env = "DROVER_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Log format (json or text).
    #[arg(long, env = "DROVER_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "DROVER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, url) in [("--agent-url", &self.agent_url), ("--data-url", &self.data_url)] {
            if !url.starts_with("ws://") && !url.starts_with("wss://") {
                anyhow::bail!("{name} must be a ws:// or wss:// URL");
            }
        }
        if !self.browser_url.starts_with("http://") && !self.browser_url.starts_with("https://") {
            anyhow::bail!("--browser-url must be an http:// or https:// URL");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
