// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue and scheduler: admission checks, the in-memory FIFO, and the
//! single-consumer drain loop.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::command::{Command, CommandResult};
use crate::error::ErrorCode;
use crate::executor::Executor;
use crate::gate;
use crate::state::EngineState;
use crate::store::{LogEntry, ResultSummary};

/// Admit a command or reject it synchronously.
///
/// Rejections are logged and never enqueued. Admission appends to the
/// FIFO, notifies the drain loop, and returns `{status: queued}`.
pub async fn enqueue(state: &EngineState, command: Command) -> CommandResult {
    let settings = state.settings.read().await.clone();

    let rejection = if command.id.trim().is_empty() || command.verb().is_none() {
        Some(ErrorCode::InvalidCommand)
    } else if !settings.agent_control_enabled {
        Some(ErrorCode::AgentDisabled)
    } else if !state.rate.lock().try_admit(settings.max_commands_per_minute) {
        Some(ErrorCode::RateLimited)
    } else if command
        .url()
        .is_some_and(|url| !gate::allowed(url, &settings.allowed_origins))
    {
        Some(ErrorCode::DomainNotAllowed)
    } else {
        None
    };

    if let Some(code) = rejection {
        info!(id = %command.id, command_type = %command.command_type, code = %code, "command rejected");
        let result = CommandResult::rejected(code);
        state.store.append_log(LogEntry::for_step(&command, &result));
        if !command.id.trim().is_empty() {
            state.store.record_result(&command.id, ResultSummary::for_step(&command, &result));
        }
        state.emit_state().await;
        return result;
    }

    debug!(id = %command.id, command_type = %command.command_type, "command queued");
    state.queue.push(command);
    state.emit_state().await;
    CommandResult::queued()
}

/// Spawn the single drain task. Runs until shutdown.
pub fn spawn_drain(state: Arc<EngineState>, executor: Arc<Executor>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = state.queue.notified() => {}
            }
            drain(&state, &executor).await;
        }
    })
}

/// Drain the queue to empty. Strictly one command executes at a time;
/// re-entry while a drain is running is a no-op.
pub async fn drain(state: &EngineState, executor: &Executor) {
    if state.processing.swap(true, Ordering::SeqCst) {
        return;
    }
    while let Some(command) = state.queue.pop() {
        if state.shutdown.is_cancelled() {
            break;
        }
        let result = executor.execute(&command).await;
        executor.finalize_step(&command, &result).await;
        state.emit_state().await;
    }
    state.processing.store(false, Ordering::SeqCst);
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
