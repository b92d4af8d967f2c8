// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: builders, mocks, and assertion helpers.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::adapter::{AdapterOutcome, ContentAdapter};
use crate::browser::{BrowserHost, ResponseBody, ResponseEvent, TabId};
use crate::executor::Executor;
use crate::frame::EventFrame;
use crate::settings::Settings;
use crate::state::{EngineChannels, EngineState};
use crate::store::StateStore;

/// A scriptable browser host for deterministic engine tests.
pub struct MockHost {
    next_tab: AtomicU64,
    pub opened: Mutex<Vec<String>>,
    pub closed: Mutex<Vec<TabId>>,
    pub detached: Mutex<Vec<TabId>>,
    pub evaluated: Mutex<Vec<(TabId, String)>>,
    attach_fails: AtomicBool,
    navigation_hangs: AtomicBool,
    bodies: Mutex<HashMap<String, ResponseBody>>,
    event_txs: Mutex<HashMap<TabId, mpsc::Sender<ResponseEvent>>>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            next_tab: AtomicU64::new(1),
            opened: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            detached: Mutex::new(Vec::new()),
            evaluated: Mutex::new(Vec::new()),
            attach_fails: AtomicBool::new(false),
            navigation_hangs: AtomicBool::new(false),
            bodies: Mutex::new(HashMap::new()),
            event_txs: Mutex::new(HashMap::new()),
        }
    }

    /// Make every subsequent attach fail.
    pub fn fail_attach(&self) {
        self.attach_fails.store(true, Ordering::SeqCst);
    }

    /// Make every subsequent load wait hang forever.
    pub fn hang_navigation(&self) {
        self.navigation_hangs.store(true, Ordering::SeqCst);
    }

    /// Provide the body returned for a protocol request id.
    pub fn set_body(&self, request_id: &str, raw: &str, base64_encoded: bool) {
        self.bodies.lock().insert(
            request_id.to_owned(),
            ResponseBody { body: raw.to_owned(), base64_encoded },
        );
    }

    /// Push a response event into an attached tab's stream. Returns false
    /// when no live probe is listening.
    pub async fn inject_response(
        &self,
        tab: TabId,
        request_id: &str,
        url: &str,
        mime_type: &str,
    ) -> bool {
        let tx = self.event_txs.lock().get(&tab).cloned();
        match tx {
            Some(tx) => tx
                .send(ResponseEvent {
                    request_id: request_id.to_owned(),
                    url: url.to_owned(),
                    mime_type: mime_type.to_owned(),
                })
                .await
                .is_ok(),
            None => false,
        }
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }
}

#[async_trait]
impl BrowserHost for MockHost {
    async fn open_tab(&self, url: &str, _active: bool) -> anyhow::Result<TabId> {
        let tab = self.next_tab.fetch_add(1, Ordering::Relaxed);
        self.opened.lock().push(url.to_owned());
        Ok(tab)
    }

    async fn wait_for_load(&self, _tab: TabId) -> anyhow::Result<()> {
        if self.navigation_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn attach(&self, tab: TabId) -> anyhow::Result<mpsc::Receiver<ResponseEvent>> {
        if self.attach_fails.load(Ordering::SeqCst) {
            anyhow::bail!("debugger attach refused");
        }
        let (tx, rx) = mpsc::channel(64);
        self.event_txs.lock().insert(tab, tx);
        Ok(rx)
    }

    async fn fetch_body(&self, _tab: TabId, request_id: &str) -> anyhow::Result<ResponseBody> {
        Ok(self
            .bodies
            .lock()
            .get(request_id)
            .cloned()
            .unwrap_or(ResponseBody { body: "{}".to_owned(), base64_encoded: false }))
    }

    async fn evaluate(&self, tab: TabId, expression: &str) -> anyhow::Result<Value> {
        self.evaluated.lock().push((tab, expression.to_owned()));
        Ok(Value::Null)
    }

    async fn detach(&self, tab: TabId) -> anyhow::Result<()> {
        self.detached.lock().push(tab);
        self.event_txs.lock().remove(&tab);
        Ok(())
    }

    async fn close_tab(&self, tab: TabId) -> anyhow::Result<()> {
        self.closed.lock().push(tab);
        Ok(())
    }
}

/// A scriptable content adapter.
pub struct MockAdapter {
    pub scroll_outcome: Mutex<AdapterOutcome>,
    pub click_outcome: Mutex<AdapterOutcome>,
    pub extract_outcome: Mutex<AdapterOutcome>,
    /// Answers returned by successive `active_page` calls; `None` when
    /// exhausted.
    pub active_pages: Mutex<VecDeque<Option<u32>>>,
    pub calls: Mutex<Vec<String>>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            scroll_outcome: Mutex::new(AdapterOutcome::ok(json!({"iterations": 1}))),
            click_outcome: Mutex::new(AdapterOutcome::ok(json!({"clicks": 1}))),
            extract_outcome: Mutex::new(AdapterOutcome::ok(json!({"listings": [], "schemas": []}))),
            active_pages: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_extract(&self, outcome: AdapterOutcome) {
        *self.extract_outcome.lock() = outcome;
    }

    pub fn set_click(&self, outcome: AdapterOutcome) {
        *self.click_outcome.lock() = outcome;
    }

    pub fn push_active_page(&self, page: Option<u32>) {
        self.active_pages.lock().push_back(page);
    }
}

#[async_trait]
impl ContentAdapter for MockAdapter {
    async fn scroll_to_bottom(
        &self,
        _tab: TabId,
        _step: u64,
        _delay_ms: u64,
        _max_iterations: u64,
    ) -> AdapterOutcome {
        self.calls.lock().push("scroll".to_owned());
        self.scroll_outcome.lock().clone()
    }

    async fn click(
        &self,
        _tab: TabId,
        selector: &str,
        _max_times: u64,
        _delay_ms: u64,
    ) -> AdapterOutcome {
        self.calls.lock().push(format!("click:{selector}"));
        self.click_outcome.lock().clone()
    }

    async fn extract(&self, _tab: TabId, _types: &[String]) -> AdapterOutcome {
        self.calls.lock().push("extract".to_owned());
        self.extract_outcome.lock().clone()
    }

    async fn active_page(&self, _tab: TabId) -> Option<u32> {
        self.calls.lock().push("active_page".to_owned());
        self.active_pages.lock().pop_front().flatten()
    }
}

/// Test-only handle bundling the engine with its mocks and the receiver
/// ends normally consumed by the bridge and streamer tasks.
pub struct EngineCtx {
    pub state: Arc<EngineState>,
    pub executor: Arc<Executor>,
    pub host: Arc<MockHost>,
    pub adapter: Arc<MockAdapter>,
    pub frame_rx: mpsc::UnboundedReceiver<EventFrame>,
    pub record_rx: mpsc::UnboundedReceiver<Value>,
}

impl EngineCtx {
    /// Drain all pending event frames without waiting.
    pub fn drain_frames(&mut self) -> Vec<EventFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.frame_rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Drain all pending sink records without waiting.
    pub fn drain_records(&mut self) -> Vec<Value> {
        let mut records = Vec::new();
        while let Ok(record) = self.record_rx.try_recv() {
            records.push(record);
        }
        records
    }
}

/// Builder for constructing an engine in tests with sensible defaults.
pub struct EngineBuilder {
    settings: Settings,
    state_dir: Option<PathBuf>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        let mut settings = Settings::default();
        // Generous ceiling so unrelated tests never trip the limiter.
        settings.max_commands_per_minute = 1000;
        Self { settings, state_dir: None }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn tweak(mut self, f: impl FnOnce(&mut Settings)) -> Self {
        f(&mut self.settings);
        self
    }

    pub fn state_dir(mut self, dir: PathBuf) -> Self {
        self.state_dir = Some(dir);
        self
    }

    pub fn build(self) -> EngineCtx {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (record_tx, record_rx) = mpsc::unbounded_channel();
        let store = StateStore::open(self.state_dir);
        let state = Arc::new(EngineState::new(
            self.settings,
            store,
            EngineChannels { frame_tx, record_tx },
            CancellationToken::new(),
        ));
        let host = Arc::new(MockHost::new());
        let adapter = Arc::new(MockAdapter::new());
        let executor = Arc::new(Executor::new(
            Arc::clone(&state),
            Arc::clone(&host) as Arc<dyn BrowserHost>,
            Arc::clone(&adapter) as Arc<dyn ContentAdapter>,
        ));
        EngineCtx { state, executor, host, adapter, frame_rx, record_rx }
    }
}

/// Extension trait to convert any `Display` error into `anyhow::Error`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
