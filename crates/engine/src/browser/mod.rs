// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser host seam: the engine drives a real browser through this
//! trait. The production implementation speaks the DevTools protocol
//! ([`cdp::CdpHost`]); tests substitute a mock.

pub mod cdp;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// Engine-assigned tab identifier.
pub type TabId = u64;

/// A network response observed by the debugging probe on a tab.
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    /// Protocol-level request id used to fetch the body.
    pub request_id: String,
    pub url: String,
    pub mime_type: String,
}

/// A fetched response body, possibly base64-encoded in transport.
#[derive(Debug, Clone)]
pub struct ResponseBody {
    pub body: String,
    pub base64_encoded: bool,
}

/// The operations the engine needs from the browser.
///
/// All methods are best-effort from the engine's perspective: failures map
/// to command error codes, never panics.
#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// Open a tab on `url`. `active` controls focus; the engine opens
    /// automation tabs in the background.
    async fn open_tab(&self, url: &str, active: bool) -> anyhow::Result<TabId>;

    /// Resolve once the tab's page load event has fired. Callers apply
    /// their own timeout.
    async fn wait_for_load(&self, tab: TabId) -> anyhow::Result<()>;

    /// Attach the debugging probe: enable the network and page domains and
    /// return the stream of observed responses.
    async fn attach(&self, tab: TabId) -> anyhow::Result<mpsc::Receiver<ResponseEvent>>;

    /// Fetch a response body observed earlier on this tab.
    async fn fetch_body(&self, tab: TabId, request_id: &str) -> anyhow::Result<ResponseBody>;

    /// Evaluate a script in the tab and return its JSON value.
    async fn evaluate(&self, tab: TabId, expression: &str) -> anyhow::Result<Value>;

    /// Detach the probe. Idempotent.
    async fn detach(&self, tab: TabId) -> anyhow::Result<()>;

    /// Close the tab. Idempotent.
    async fn close_tab(&self, tab: TabId) -> anyhow::Result<()>;
}
