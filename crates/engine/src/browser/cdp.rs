// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DevTools-protocol browser host.
//!
//! Tabs are created and closed through the browser's HTTP control plane
//! (`/json/new`, `/json/close`); each open tab gets a WebSocket pump task
//! that correlates protocol calls by id and forwards page/network events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{BrowserHost, ResponseBody, ResponseEvent, TabId};

/// One in-flight protocol call awaiting its response.
struct CdpCall {
    method: String,
    params: Value,
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// Per-tab connection state.
struct TabConn {
    target_id: String,
    cmd_tx: mpsc::UnboundedSender<CdpCall>,
    load_rx: watch::Receiver<u64>,
    /// Probe subscriber; set on attach, cleared on detach.
    subscriber: Arc<Mutex<Option<mpsc::Sender<ResponseEvent>>>>,
    cancel: CancellationToken,
}

/// Target descriptor returned by the `/json` endpoints.
#[derive(Debug, Deserialize)]
struct TargetInfo {
    id: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    ws_url: Option<String>,
}

/// DevTools-protocol implementation of [`BrowserHost`].
pub struct CdpHost {
    http: reqwest::Client,
    base: String,
    tabs: Mutex<HashMap<TabId, TabConn>>,
    next_tab: AtomicU64,
}

impl CdpHost {
    /// `base` is the DevTools HTTP endpoint, e.g. `http://127.0.0.1:9222`.
    pub fn new(base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_owned(),
            tabs: Mutex::new(HashMap::new()),
            next_tab: AtomicU64::new(1),
        }
    }

    async fn call(&self, tab: TabId, method: &str, params: Value) -> anyhow::Result<Value> {
        let cmd_tx = {
            let tabs = self.tabs.lock().await;
            let conn = tabs.get(&tab).with_context(|| format!("unknown tab {tab}"))?;
            conn.cmd_tx.clone()
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        cmd_tx
            .send(CdpCall { method: method.to_owned(), params, reply: reply_tx })
            .map_err(|_| anyhow::anyhow!("tab {tab} connection closed"))?;
        reply_rx.await.map_err(|_| anyhow::anyhow!("tab {tab} pump dropped the call"))?
    }
}

#[async_trait]
impl BrowserHost for CdpHost {
    /// The `/json` control plane opens tabs without stealing window focus;
    /// `active` is accepted for interface parity.
    async fn open_tab(&self, url: &str, _active: bool) -> anyhow::Result<TabId> {
        let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
        let target: TargetInfo = self
            .http
            .put(format!("{}/json/new?{encoded}", self.base))
            .send()
            .await
            .context("tab create request failed")?
            .error_for_status()?
            .json()
            .await
            .context("tab create response unreadable")?;
        let ws_url = target.ws_url.context("target has no debugger URL")?;

        let (ws, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .context("debugger socket connect failed")?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (load_tx, load_rx) = watch::channel(0u64);
        let subscriber: Arc<Mutex<Option<mpsc::Sender<ResponseEvent>>>> =
            Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        tokio::spawn(pump(ws, cmd_rx, load_tx, Arc::clone(&subscriber), cancel.clone()));

        let tab = self.next_tab.fetch_add(1, Ordering::Relaxed);
        self.tabs.lock().await.insert(
            tab,
            TabConn { target_id: target.id, cmd_tx, load_rx, subscriber, cancel },
        );
        // Enable the page domain right away so the load event is counted
        // even when navigation beats the first wait.
        self.call(tab, "Page.enable", json!({})).await?;
        Ok(tab)
    }

    async fn wait_for_load(&self, tab: TabId) -> anyhow::Result<()> {
        let mut load_rx = {
            let tabs = self.tabs.lock().await;
            let conn = tabs.get(&tab).with_context(|| format!("unknown tab {tab}"))?;
            conn.load_rx.clone()
        };
        while *load_rx.borrow() == 0 {
            load_rx.changed().await.map_err(|_| anyhow::anyhow!("tab {tab} pump exited"))?;
        }
        Ok(())
    }

    async fn attach(&self, tab: TabId) -> anyhow::Result<mpsc::Receiver<ResponseEvent>> {
        self.call(tab, "Network.enable", json!({})).await?;
        self.call(tab, "Page.enable", json!({})).await?;
        let (tx, rx) = mpsc::channel(256);
        let subscriber = {
            let tabs = self.tabs.lock().await;
            let conn = tabs.get(&tab).with_context(|| format!("unknown tab {tab}"))?;
            Arc::clone(&conn.subscriber)
        };
        *subscriber.lock().await = Some(tx);
        Ok(rx)
    }

    async fn fetch_body(&self, tab: TabId, request_id: &str) -> anyhow::Result<ResponseBody> {
        let result =
            self.call(tab, "Network.getResponseBody", json!({"requestId": request_id})).await?;
        Ok(ResponseBody {
            body: result.get("body").and_then(Value::as_str).unwrap_or_default().to_owned(),
            base64_encoded: result
                .get("base64Encoded")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    async fn evaluate(&self, tab: TabId, expression: &str) -> anyhow::Result<Value> {
        let result = self
            .call(
                tab,
                "Runtime.evaluate",
                json!({"expression": expression, "returnByValue": true, "awaitPromise": true}),
            )
            .await?;
        if let Some(desc) = result.pointer("/exceptionDetails/exception/description") {
            anyhow::bail!("script threw: {desc}");
        }
        Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    async fn detach(&self, tab: TabId) -> anyhow::Result<()> {
        let subscriber = {
            let tabs = self.tabs.lock().await;
            match tabs.get(&tab) {
                Some(conn) => Arc::clone(&conn.subscriber),
                None => return Ok(()),
            }
        };
        *subscriber.lock().await = None;
        let _ = self.call(tab, "Network.disable", json!({})).await;
        Ok(())
    }

    async fn close_tab(&self, tab: TabId) -> anyhow::Result<()> {
        let Some(conn) = self.tabs.lock().await.remove(&tab) else {
            return Ok(());
        };
        conn.cancel.cancel();
        let resp = self
            .http
            .get(format!("{}/json/close/{}", self.base, conn.target_id))
            .send()
            .await
            .context("tab close request failed")?;
        resp.error_for_status()?;
        Ok(())
    }
}

/// Per-tab socket pump: correlates call responses by id, counts page load
/// events, and forwards network responses to the probe subscriber.
async fn pump(
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    mut cmd_rx: mpsc::UnboundedReceiver<CdpCall>,
    load_tx: watch::Sender<u64>,
    subscriber: Arc<Mutex<Option<mpsc::Sender<ResponseEvent>>>>,
    cancel: CancellationToken,
) {
    let (mut write, mut read) = ws.split();
    let mut pending: HashMap<u64, oneshot::Sender<anyhow::Result<Value>>> = HashMap::new();
    let mut next_id: u64 = 0;
    let mut loads: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            call = cmd_rx.recv() => {
                let Some(call) = call else { break };
                next_id += 1;
                let frame = json!({"id": next_id, "method": call.method, "params": call.params});
                pending.insert(next_id, call.reply);
                let Ok(text) = serde_json::to_string(&frame) else { continue };
                if write.send(Message::Text(text.into())).await.is_err() {
                    debug!("debugger socket write failed");
                    break;
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(value) = serde_json::from_str::<Value>(&text) else { continue };
                        if let Some(id) = value.get("id").and_then(Value::as_u64) {
                            if let Some(reply) = pending.remove(&id) {
                                let outcome = match value.get("error") {
                                    Some(err) => Err(anyhow::anyhow!("protocol error: {err}")),
                                    None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
                                };
                                let _ = reply.send(outcome);
                            }
                            continue;
                        }
                        match value.get("method").and_then(Value::as_str) {
                            Some("Page.loadEventFired") => {
                                loads += 1;
                                let _ = load_tx.send(loads);
                            }
                            Some("Network.responseReceived") => {
                                let params = value.get("params").cloned().unwrap_or(Value::Null);
                                let event = ResponseEvent {
                                    request_id: params
                                        .get("requestId")
                                        .and_then(Value::as_str)
                                        .unwrap_or_default()
                                        .to_owned(),
                                    url: params
                                        .pointer("/response/url")
                                        .and_then(Value::as_str)
                                        .unwrap_or_default()
                                        .to_owned(),
                                    mime_type: params
                                        .pointer("/response/mimeType")
                                        .and_then(Value::as_str)
                                        .unwrap_or_default()
                                        .to_owned(),
                                };
                                if let Some(tx) = subscriber.lock().await.as_ref() {
                                    let _ = tx.try_send(event);
                                }
                            }
                            _ => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(err = %e, "debugger socket error");
                        break;
                    }
                    _ => {} // ping/pong/binary ignored
                }
            }
        }
    }

    // Fail any calls still waiting so callers don't hang.
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(anyhow::anyhow!("debugger socket closed")));
    }
}
