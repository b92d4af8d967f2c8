// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end engine scenarios.
//!
//! The engine runs in-process against the mock browser host; the agent
//! and sink sides are real WebSocket listeners so the bridge and streamer
//! are exercised over actual sockets.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// A WebSocket listener standing in for the agent or the data sink.
pub struct WsServer {
    listener: TcpListener,
    port: u16,
}

impl WsServer {
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Accept one client connection and complete the handshake.
    pub async fn accept(&self, timeout: Duration) -> anyhow::Result<WsPeer> {
        let accept = async {
            let (stream, _) = self.listener.accept().await?;
            let ws = tokio_tungstenite::accept_async(stream).await?;
            anyhow::Ok(WsPeer { ws })
        };
        tokio::time::timeout(timeout, accept)
            .await
            .map_err(|_| anyhow::anyhow!("no client connected within {timeout:?}"))?
    }
}

/// One accepted connection, seen from the agent/sink side.
pub struct WsPeer {
    ws: WebSocketStream<TcpStream>,
}

impl WsPeer {
    pub async fn send_json(&mut self, value: &Value) -> anyhow::Result<()> {
        self.ws.send(Message::Text(value.to_string().into())).await?;
        Ok(())
    }

    /// Receive the next text frame as JSON, skipping control frames.
    pub async fn recv_json(&mut self, timeout: Duration) -> anyhow::Result<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .ok_or_else(|| anyhow::anyhow!("no frame within {timeout:?}"))?;
            let msg = tokio::time::timeout(remaining, self.ws.next())
                .await
                .map_err(|_| anyhow::anyhow!("no frame within {timeout:?}"))?;
            match msg {
                Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
                Some(Ok(Message::Close(_))) | None => anyhow::bail!("peer closed"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => anyhow::bail!("socket error: {e}"),
            }
        }
    }

    /// Receive frames until one satisfies the predicate, returning it and
    /// every frame seen before it (in order).
    pub async fn recv_until(
        &mut self,
        timeout: Duration,
        mut pred: impl FnMut(&Value) -> bool,
    ) -> anyhow::Result<(Vec<Value>, Value)> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut seen = Vec::new();
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .ok_or_else(|| anyhow::anyhow!("predicate not satisfied within {timeout:?}"))?;
            let frame = self.recv_json(remaining).await?;
            if pred(&frame) {
                return Ok((seen, frame));
            }
            seen.push(frame);
        }
    }

    /// Close the connection from the server side.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
