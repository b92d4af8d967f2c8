// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content adapter: the narrow interface the executor calls per tab.
//!
//! Site-specific selectors and shape transforms live behind this trait;
//! the engine only sees `{ok, data?, error?}` outcomes. Error strings are
//! snake_case tokens; the executor maps `element_not_found` to its error
//! code and treats everything else as a content-script failure.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::browser::{BrowserHost, TabId};

/// Result of one adapter operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AdapterOutcome {
    pub fn ok(data: Value) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { ok: false, data: None, error: Some(error.into()) }
    }
}

/// DOM-side operations the executor needs.
#[async_trait]
pub trait ContentAdapter: Send + Sync {
    async fn scroll_to_bottom(
        &self,
        tab: TabId,
        step: u64,
        delay_ms: u64,
        max_iterations: u64,
    ) -> AdapterOutcome;

    async fn click(&self, tab: TabId, selector: &str, max_times: u64, delay_ms: u64)
        -> AdapterOutcome;

    /// Extract structured records from the rendered page. Success data is
    /// `{listings: [...], schemas: [...]}`.
    async fn extract(&self, tab: TabId, types: &[String]) -> AdapterOutcome;

    /// The page number the site currently believes it is showing.
    async fn active_page(&self, tab: TabId) -> Option<u32>;
}

/// Production adapter: drives the page through `Runtime.evaluate`.
pub struct DomAdapter {
    host: Arc<dyn BrowserHost>,
}

impl DomAdapter {
    pub fn new(host: Arc<dyn BrowserHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl ContentAdapter for DomAdapter {
    async fn scroll_to_bottom(
        &self,
        tab: TabId,
        step: u64,
        delay_ms: u64,
        max_iterations: u64,
    ) -> AdapterOutcome {
        let mut iterations = 0u64;
        for _ in 0..max_iterations {
            let expr = format!(
                "(() => {{ window.scrollBy(0, {step}); \
                 return window.scrollY + window.innerHeight >= \
                 document.documentElement.scrollHeight - 2; }})()"
            );
            let at_bottom = match self.host.evaluate(tab, &expr).await {
                Ok(value) => value.as_bool().unwrap_or(false),
                Err(e) => return AdapterOutcome::err(format!("scroll_failed: {e}")),
            };
            iterations += 1;
            if at_bottom {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
        AdapterOutcome::ok(json!({"iterations": iterations}))
    }

    async fn click(
        &self,
        tab: TabId,
        selector: &str,
        max_times: u64,
        delay_ms: u64,
    ) -> AdapterOutcome {
        let escaped = selector.replace('\\', "\\\\").replace('"', "\\\"");
        let mut clicks = 0u64;
        for _ in 0..max_times {
            let expr = format!(
                "(() => {{ const el = document.querySelector(\"{escaped}\"); \
                 if (!el) return false; el.click(); return true; }})()"
            );
            let clicked = match self.host.evaluate(tab, &expr).await {
                Ok(value) => value.as_bool().unwrap_or(false),
                Err(e) => return AdapterOutcome::err(format!("click_failed: {e}")),
            };
            if !clicked {
                if clicks == 0 {
                    return AdapterOutcome::err("element_not_found");
                }
                break;
            }
            clicks += 1;
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
        AdapterOutcome::ok(json!({"clicks": clicks}))
    }

    async fn extract(&self, tab: TabId, _types: &[String]) -> AdapterOutcome {
        // JSON-LD blocks carry the structured records; listing anchors are
        // collected as a fallback shape for pages without markup.
        let expr = r#"(() => {
            const schemas = [];
            for (const node of document.querySelectorAll('script[type="application/ld+json"]')) {
                try { schemas.push(JSON.parse(node.textContent)); } catch (e) {}
            }
            const listings = [];
            for (const el of document.querySelectorAll('[data-listing-id]')) {
                const link = el.querySelector('a[href]');
                const title = (el.querySelector('h3, h2') || {}).textContent || '';
                listings.push({
                    listingId: el.getAttribute('data-listing-id'),
                    title: title.trim(),
                    url: link ? link.href : '',
                });
            }
            return {listings, schemas};
        })()"#;
        match self.host.evaluate(tab, expr).await {
            Ok(value) => AdapterOutcome::ok(value),
            Err(e) => AdapterOutcome::err(format!("extract_failed: {e}")),
        }
    }

    async fn active_page(&self, tab: TabId) -> Option<u32> {
        let expr = r#"(() => {
            const current = document.querySelector('[aria-current="page"], [aria-current="true"]');
            if (current) {
                const n = parseInt(current.textContent, 10);
                if (!isNaN(n)) return n;
            }
            const page = new URLSearchParams(location.search).get('page');
            return page ? parseInt(page, 10) : 1;
        })()"#;
        let value = self.host.evaluate(tab, expr).await.ok()?;
        value.as_u64().and_then(|n| u32::try_from(n).ok())
    }
}
