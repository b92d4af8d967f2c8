// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tab session manager: per-tab capture state, slot admission, and
//! idempotent teardown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::browser::{BrowserHost, TabId};

/// How often a waiting command re-checks the concurrent-tab ceiling.
pub const SLOT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// What a capture handler should make of the buffered bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    Listings,
    Reviews,
}

impl CaptureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listings => "listings",
            Self::Reviews => "reviews",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "listings" => Some(Self::Listings),
            "reviews" => Some(Self::Reviews),
            _ => None,
        }
    }
}

/// One buffered response body.
#[derive(Debug, Clone)]
pub struct CapturedBody {
    pub url: String,
    pub raw: String,
}

/// Per-tab capture state, owned by the command chain that opened the tab.
#[derive(Debug)]
pub struct Session {
    pub command_id: String,
    pub capture_mode: CaptureKind,
    pub captured: Vec<CapturedBody>,
    /// Scopes the probe task; cancelled on cleanup.
    probe: CancellationToken,
}

/// Mapping from tab id to live [`Session`].
///
/// A session exists exactly while the probe is attached to its tab;
/// cleanup always detaches before removing the entry.
#[derive(Default)]
pub struct TabSessions {
    inner: Mutex<HashMap<TabId, Session>>,
}

impl TabSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block cooperatively until a session slot is free or shutdown fires.
    pub async fn reserve_slot(&self, max_concurrent: usize, shutdown: &CancellationToken) {
        loop {
            if self.inner.lock().await.len() < max_concurrent {
                return;
            }
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(SLOT_POLL_INTERVAL) => {}
            }
        }
    }

    /// Register a session for a freshly-attached tab. Returns the token
    /// scoping the probe task.
    pub async fn open(&self, tab: TabId, command_id: &str) -> CancellationToken {
        let probe = CancellationToken::new();
        let session = Session {
            command_id: command_id.to_owned(),
            capture_mode: CaptureKind::Listings,
            captured: Vec::new(),
            probe: probe.clone(),
        };
        self.inner.lock().await.insert(tab, session);
        probe
    }

    /// Set the capture mode without touching the buffer.
    pub async fn set_capture_mode(&self, tab: TabId, mode: CaptureKind) -> bool {
        match self.inner.lock().await.get_mut(&tab) {
            Some(session) => {
                session.capture_mode = mode;
                true
            }
            None => false,
        }
    }

    /// Append a captured body. Returns false when no session owns the tab
    /// (probe events after cleanup land here and are dropped).
    pub async fn push_body(&self, tab: TabId, body: CapturedBody) -> bool {
        match self.inner.lock().await.get_mut(&tab) {
            Some(session) => {
                session.captured.push(body);
                true
            }
            None => false,
        }
    }

    /// Snapshot the buffered bodies and the capture mode.
    pub async fn captured(&self, tab: TabId) -> Option<(CaptureKind, Vec<CapturedBody>)> {
        self.inner
            .lock()
            .await
            .get(&tab)
            .map(|s| (s.capture_mode, s.captured.clone()))
    }

    pub async fn contains(&self, tab: TabId) -> bool {
        self.inner.lock().await.contains_key(&tab)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Tear down a session: cancel the probe, detach (best-effort), drop
    /// the entry, and optionally close the tab (best-effort). Idempotent.
    pub async fn cleanup(&self, tab: TabId, host: &Arc<dyn BrowserHost>, close_tab: bool) {
        let existed = {
            let mut inner = self.inner.lock().await;
            match inner.remove(&tab) {
                Some(session) => {
                    session.probe.cancel();
                    true
                }
                None => false,
            }
        };
        if existed {
            if let Err(e) = host.detach(tab).await {
                debug!(tab, err = %e, "probe detach failed");
            }
        }
        if close_tab {
            if let Err(e) = host.close_tab(tab).await {
                debug!(tab, err = %e, "tab close failed");
            }
        }
    }

    /// Tear down every session; used by the shutdown path.
    pub async fn cleanup_all(&self, host: &Arc<dyn BrowserHost>) {
        let tabs: Vec<TabId> = self.inner.lock().await.keys().copied().collect();
        for tab in tabs {
            self.cleanup(tab, host, true).await;
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
