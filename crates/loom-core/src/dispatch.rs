// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use loom_tools::{ToolCall, ToolErrorKind, ToolOutput, ToolRegistry};

use crate::AgentEvent;

/// Results of one step's tool calls, indexed like the request.
pub(crate) struct DispatchReport {
    /// `None` only for calls that had not finished when the deadline passed.
    pub outputs: Vec<Option<ToolOutput>>,
    pub timed_out: bool,
}

/// Split calls into execution lanes.  Calls sharing a resource key land in
/// the same lane, in request order; every other call gets a lane of its own.
pub(crate) fn plan_lanes(registry: &ToolRegistry, calls: &[ToolCall]) -> Vec<Vec<usize>> {
    let mut lanes: Vec<Vec<usize>> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    for (i, call) in calls.iter().enumerate() {
        match registry.resource_key(call) {
            Some(key) => {
                let lane = *by_key.entry(key).or_insert_with(|| {
                    lanes.push(Vec::new());
                    lanes.len() - 1
                });
                lanes[lane].push(i);
            }
            None => lanes.push(vec![i]),
        }
    }
    lanes
}

/// Execute every call, lanes in parallel and calls within a lane one after
/// the other.  When `deadline` passes, unfinished lanes are aborted and the
/// report carries whatever completed.
pub(crate) async fn dispatch(
    registry: Arc<ToolRegistry>,
    calls: &[ToolCall],
    deadline: Option<Instant>,
    tx: &mpsc::Sender<AgentEvent>,
) -> DispatchReport {
    let lanes = plan_lanes(&registry, calls);
    debug!(calls = calls.len(), lanes = lanes.len(), "dispatching tool calls");

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(usize, ToolOutput)>();
    let mut handles = Vec::with_capacity(lanes.len());
    for lane in lanes {
        let registry = Arc::clone(&registry);
        let done_tx = done_tx.clone();
        let batch: Vec<(usize, ToolCall)> = lane.into_iter().map(|i| (i, calls[i].clone())).collect();
        handles.push(tokio::spawn(async move {
            for (i, call) in batch {
                let output = run_isolated(Arc::clone(&registry), call).await;
                if done_tx.send((i, output)).is_err() {
                    break;
                }
            }
        }));
    }
    drop(done_tx);

    let mut outputs: Vec<Option<ToolOutput>> = vec![None; calls.len()];
    let mut timed_out = false;
    loop {
        let next = match deadline {
            Some(at) => tokio::select! {
                biased;
                r = done_rx.recv() => r,
                _ = tokio::time::sleep_until(at) => {
                    timed_out = true;
                    None
                }
            },
            None => done_rx.recv().await,
        };
        let Some((i, output)) = next else { break };
        let _ = tx
            .send(AgentEvent::ToolCallFinished {
                call_id: calls[i].id.clone(),
                tool_name: calls[i].name.clone(),
                output: output.content.clone(),
                is_error: output.is_error,
            })
            .await;
        outputs[i] = Some(output);
    }

    if timed_out {
        let pending = outputs.iter().filter(|o| o.is_none()).count();
        warn!(pending, "run deadline passed during tool dispatch");
        for h in &handles {
            h.abort();
        }
    }

    DispatchReport { outputs, timed_out }
}

/// Run one call on its own task so a panic is contained and reported as a
/// failed tool result.
async fn run_isolated(registry: Arc<ToolRegistry>, call: ToolCall) -> ToolOutput {
    let call_id = call.id.clone();
    let tool_name = call.name.clone();
    match tokio::spawn(async move { registry.execute(&call).await }).await {
        Ok(output) => output,
        Err(e) => {
            warn!(tool = %tool_name, error = %e, "tool task failed");
            ToolOutput::failure(
                call_id,
                ToolErrorKind::ToolExecutionFailure,
                format!("tool execution panicked: {e}"),
                Value::Null,
            )
        }
    }
}
