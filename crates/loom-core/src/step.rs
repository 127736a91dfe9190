// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use loom_model::{CompletionRequest, Message, ModelProvider, ResponseEvent, ToolSchema};
use loom_tools::ToolCall;

use crate::{AgentError, AgentEvent};

/// What the model decided in one step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// The model answered without calling tools.  Terminal.
    FinalAnswer(String),
    /// The model asked for tools.  `text` is whatever it said alongside.
    ToolInvocations { text: String, calls: Vec<ToolCall> },
}

/// Invoke the model once and fold its stream into a [`StepResult`].
///
/// Any transport failure, when opening the stream, as a failed item or as
/// an error event sent by the provider, is reported as
/// [`AgentError::ModelUnavailable`] and is not retried.
pub(crate) async fn invoke(
    model: &dyn ModelProvider,
    messages: Vec<Message>,
    tools: Vec<ToolSchema>,
    tx: &mpsc::Sender<AgentEvent>,
) -> Result<StepResult, AgentError> {
    let req = CompletionRequest { messages, tools, stream: true };
    let mut stream = model
        .complete(req)
        .await
        .map_err(|e| AgentError::ModelUnavailable(format!("{e:#}")))?;

    let mut full_text = String::new();
    // Keyed by the parallel-tool-call index from the provider.
    let mut pending: HashMap<u32, PendingToolCall> = HashMap::new();

    while let Some(event) = stream.next().await {
        match event.map_err(|e| AgentError::ModelUnavailable(format!("{e:#}")))? {
            ResponseEvent::TextDelta(delta) if !delta.is_empty() => {
                full_text.push_str(&delta);
                let _ = tx.send(AgentEvent::TextDelta(delta)).await;
            }
            ResponseEvent::TextDelta(_) => {}
            ResponseEvent::ToolCall { index, id, name, arguments } => {
                let ptc = pending.entry(index).or_default();
                if !id.is_empty() {
                    ptc.id = id;
                }
                if !name.is_empty() {
                    ptc.name = name;
                }
                ptc.args_buf.push_str(&arguments);
            }
            ResponseEvent::Usage { input_tokens, output_tokens } => {
                let _ = tx
                    .send(AgentEvent::TokenUsage { input: input_tokens, output: output_tokens })
                    .await;
            }
            ResponseEvent::Done => break,
            ResponseEvent::Error(e) => {
                warn!("model stream error: {e}");
                let _ = tx.send(AgentEvent::Error(e.clone())).await;
                return Err(AgentError::ModelUnavailable(e));
            }
        }
    }

    if !full_text.is_empty() {
        let _ = tx.send(AgentEvent::TextComplete(full_text.clone())).await;
    }

    let calls = finish_pending(pending);
    debug!(model = model.model_name(), tool_calls = calls.len(), "model step folded");
    if calls.is_empty() {
        Ok(StepResult::FinalAnswer(full_text))
    } else {
        Ok(StepResult::ToolInvocations { text: full_text, calls })
    }
}

/// Order accumulated calls by index.  Calls without a name cannot be
/// dispatched and are dropped; an empty id gets a synthetic one so the
/// result can still be paired with its request.
fn finish_pending(pending: HashMap<u32, PendingToolCall>) -> Vec<ToolCall> {
    let mut sorted: Vec<(u32, PendingToolCall)> = pending.into_iter().collect();
    sorted.sort_by_key(|(idx, _)| *idx);

    let mut calls = Vec::with_capacity(sorted.len());
    for (i, (_, ptc)) in sorted.into_iter().enumerate() {
        if ptc.name.is_empty() {
            warn!(tool_call_id = %ptc.id, "dropping tool call with empty name from model");
            continue;
        }
        let mut tc = ptc.finish();
        if tc.id.is_empty() {
            tc.id = format!("tc_synthetic_{i}");
            warn!(tool_name = %tc.name, tool_call_id = %tc.id, "tool call had empty id; generated synthetic id");
        }
        calls.push(tc);
    }
    calls
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args_buf: String,
}

impl PendingToolCall {
    fn finish(self) -> ToolCall {
        // Arguments always resolve to a JSON value; schema validation decides
        // later whether it is acceptable.
        let args = if self.args_buf.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(&self.args_buf) {
                Ok(v) => v,
                Err(e) => {
                    warn!(
                        tool_name = %self.name,
                        tool_call_id = %self.id,
                        args_buf = %self.args_buf,
                        error = %e,
                        "model sent tool call with invalid JSON arguments; substituting {{}}"
                    );
                    Value::Object(Default::default())
                }
            }
        };
        ToolCall { id: self.id, name: self.name, args }
    }
}
