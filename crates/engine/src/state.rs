// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared engine state: the single owner of settings, stores, the rate
//! window, tab sessions, queue flags, and bridge status. All other
//! components ask this owner to mutate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio_util::sync::CancellationToken;

use crate::bridge::BridgeStatus;
use crate::command::Command;
use crate::frame::{EventFrame, ExtensionState};
use crate::rate::RateWindow;
use crate::session::TabSessions;
use crate::settings::Settings;
use crate::store::StateStore;

/// Channel endpoints the engine emits into.
pub struct EngineChannels {
    /// Event frames bound for the agent bridge (single consumer).
    pub frame_tx: mpsc::UnboundedSender<EventFrame>,
    /// Records bound for the data streamer (single consumer).
    pub record_tx: mpsc::UnboundedSender<Value>,
}

/// In-memory FIFO of admitted commands.
#[derive(Default)]
pub struct CommandQueue {
    inner: Mutex<VecDeque<Command>>,
    notify: Notify,
}

impl CommandQueue {
    pub fn push(&self, command: Command) {
        self.inner.lock().push_back(command);
        self.notify.notify_one();
    }

    pub fn pop(&self) -> Option<Command> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Await the next push notification.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Shared engine state.
pub struct EngineState {
    pub settings: RwLock<Settings>,
    pub store: StateStore,
    pub rate: Mutex<RateWindow>,
    pub sessions: Arc<TabSessions>,
    pub queue: CommandQueue,
    /// True while the drain loop is executing a command.
    pub processing: AtomicBool,
    pub bridge_status: Mutex<BridgeStatus>,
    pub channels: EngineChannels,
    pub shutdown: CancellationToken,
    /// Records streamed to the sink since startup.
    pub records_streamed: AtomicU64,
}

impl EngineState {
    pub fn new(
        settings: Settings,
        store: StateStore,
        channels: EngineChannels,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings: RwLock::new(settings),
            store,
            rate: Mutex::new(RateWindow::new()),
            sessions: Arc::new(TabSessions::new()),
            queue: CommandQueue::default(),
            processing: AtomicBool::new(false),
            bridge_status: Mutex::new(BridgeStatus::Disconnected),
            channels,
            shutdown,
            records_streamed: AtomicU64::new(0),
        }
    }

    pub fn bridge_status(&self) -> BridgeStatus {
        *self.bridge_status.lock()
    }

    pub fn set_bridge_status(&self, status: BridgeStatus) {
        *self.bridge_status.lock() = status;
    }

    /// Emit an event frame toward the agent (buffered while disconnected).
    pub fn emit(&self, frame: EventFrame) {
        let _ = self.channels.frame_tx.send(frame);
    }

    /// Emit a fresh state snapshot event.
    pub async fn emit_state(&self) {
        let payload = self.snapshot().await;
        self.emit(EventFrame::ExtensionState { payload });
    }

    /// Build the state snapshot shown to the agent.
    pub async fn snapshot(&self) -> ExtensionState {
        ExtensionState {
            settings: self.settings.read().await.clone(),
            queue_length: self.queue.len(),
            processing: self.processing.load(Ordering::SeqCst),
            logs: self.store.recent_logs(20),
            bridge_status: self.bridge_status(),
        }
    }

    /// Flip the agent-control switch, persist, and return the settings.
    pub async fn toggle_agent_control(&self, enabled: bool) -> Settings {
        let mut settings = self.settings.write().await;
        settings.agent_control_enabled = enabled;
        settings.clamp();
        let snapshot = settings.clone();
        drop(settings);
        self.store.persist_settings(&snapshot);
        snapshot
    }

    /// Send one record to the data sink and bump the counter.
    pub fn stream_record(&self, record: Value) {
        self.records_streamed.fetch_add(1, Ordering::Relaxed);
        let _ = self.channels.record_tx.send(record);
    }
}
