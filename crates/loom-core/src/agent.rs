// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use loom_memory::{MemoryStore, ThreadKey};
use loom_model::{Message, ModelProvider};
use loom_tools::{ToolErrorKind, ToolOutput, ToolRegistry};

use crate::{dispatch, step, AgentError, AgentEvent, StepResult};

/// Per-run parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Thread the run reads from and appends to
    pub scope: ThreadKey,
    /// Upper bound on model invocations; values below 1 are treated as 1
    pub max_steps: u32,
    /// Wall-clock limit for the whole run
    pub timeout: Option<Duration>,
}

impl RunConfig {
    pub fn new(scope: ThreadKey, max_steps: u32) -> Self {
        Self { scope, max_steps: max_steps.max(1), timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// How a run ended.  `steps` counts model invocations.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    FinalAnswer { text: String, steps: u32 },
    BudgetExhausted { partial_text: String, steps: u32 },
    Cancelled { partial_text: String, steps: u32 },
    TimedOut { partial_text: String, steps: u32 },
}

impl RunOutcome {
    /// The final answer, or the most recent assistant text for runs that
    /// stopped early.
    pub fn text(&self) -> &str {
        match self {
            RunOutcome::FinalAnswer { text, .. } => text,
            RunOutcome::BudgetExhausted { partial_text, .. }
            | RunOutcome::Cancelled { partial_text, .. }
            | RunOutcome::TimedOut { partial_text, .. } => partial_text,
        }
    }

    pub fn steps(&self) -> u32 {
        match self {
            RunOutcome::FinalAnswer { steps, .. }
            | RunOutcome::BudgetExhausted { steps, .. }
            | RunOutcome::Cancelled { steps, .. }
            | RunOutcome::TimedOut { steps, .. } => *steps,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, RunOutcome::FinalAnswer { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::FinalAnswer { .. } => "final-answer",
            RunOutcome::BudgetExhausted { .. } => "budget-exhausted",
            RunOutcome::Cancelled { .. } => "cancelled",
            RunOutcome::TimedOut { .. } => "timed-out",
        }
    }
}

/// A named agent: instructions plus the tools it may call, bound to a model
/// and a memory store.  Agents hold no per-run state and can serve many
/// runs at once.
pub struct Agent {
    name: String,
    instructions: String,
    tools: Arc<ToolRegistry>,
    model: Arc<dyn ModelProvider>,
    memory: Arc<dyn MemoryStore>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        model: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            tools,
            model,
            memory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run without observing events or offering cancellation.
    pub async fn run_silent(
        &self,
        user_message: &str,
        config: &RunConfig,
    ) -> Result<RunOutcome, AgentError> {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (_keep_alive, cancel) = oneshot::channel();
        self.run(user_message, config, tx, cancel).await
    }

    /// Append `user_message` to the thread and drive the model ↔ tool loop.
    ///
    /// Each step reads the thread, invokes the model once, and either ends
    /// the run with a final answer or dispatches the requested tools and
    /// appends every result before the next step.  At most
    /// `config.max_steps` model invocations are made.
    ///
    /// `cancel` is checked at the top of every step; both an explicit send
    /// and a dropped sender count as cancellation.  In-flight model and tool
    /// calls are not interrupted by it.
    pub async fn run(
        &self,
        user_message: &str,
        config: &RunConfig,
        tx: mpsc::Sender<AgentEvent>,
        mut cancel: oneshot::Receiver<()>,
    ) -> Result<RunOutcome, AgentError> {
        let scope = &config.scope;
        let max_steps = config.max_steps.max(1);
        let deadline = config.timeout.map(|t| Instant::now() + t);

        // Already cancelled: leave the thread untouched.
        if is_cancelled(&mut cancel) {
            let outcome = RunOutcome::Cancelled { partial_text: String::new(), steps: 0 };
            let _ = tx.send(AgentEvent::RunFinished(outcome.clone())).await;
            return Ok(outcome);
        }

        info!(agent = %self.name, thread = %scope, max_steps, "run started");
        self.memory.append(scope, Message::user(user_message)).await?;

        let tool_schemas: Vec<loom_model::ToolSchema> = self
            .tools
            .schemas()
            .into_iter()
            .map(|s| loom_model::ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect();

        let mut partial_text = String::new();
        let mut steps = 0u32;

        let outcome = loop {
            if is_cancelled(&mut cancel) {
                break RunOutcome::Cancelled { partial_text, steps };
            }
            if deadline.is_some_and(|at| Instant::now() >= at) {
                break RunOutcome::TimedOut { partial_text, steps };
            }
            if steps >= max_steps {
                break RunOutcome::BudgetExhausted { partial_text, steps };
            }

            steps += 1;
            let _ = tx.send(AgentEvent::StepStarted { step: steps }).await;

            let history = self.memory.read(scope).await?;
            let mut messages = Vec::with_capacity(history.len() + 1);
            messages.push(Message::system(&self.instructions));
            messages.extend(history.into_iter().map(|m| m.message));

            let invocation = step::invoke(self.model.as_ref(), messages, tool_schemas.clone(), &tx);
            let result = match deadline {
                Some(at) => match tokio::time::timeout_at(at, invocation).await {
                    Ok(r) => r?,
                    Err(_) => break RunOutcome::TimedOut { partial_text, steps },
                },
                None => invocation.await?,
            };

            let (text, calls) = match result {
                StepResult::FinalAnswer(text) => {
                    self.memory.append(scope, Message::assistant(&text)).await?;
                    let _ = tx.send(AgentEvent::StepFinished { step: steps, tool_calls: 0 }).await;
                    break RunOutcome::FinalAnswer { text, steps };
                }
                StepResult::ToolInvocations { text, calls } => (text, calls),
            };

            // Phase 1: assistant text and one tool-call message per call.
            let mut requested = Vec::with_capacity(calls.len() + 1);
            if !text.is_empty() {
                requested.push(Message::assistant(&text));
            }
            partial_text = text;
            for tc in &calls {
                let _ = tx.send(AgentEvent::ToolCallStarted(tc.clone())).await;
                requested.push(Message::tool_call(&tc.id, &tc.name, tc.args.to_string()));
            }
            self.memory.append_many(scope, requested).await?;

            // Phase 2: execute.
            let report = dispatch::dispatch(Arc::clone(&self.tools), &calls, deadline, &tx).await;

            // Phase 3: results in request order, as one batch.  Calls cut off
            // by the deadline still get a result so every call is answered.
            let results: Vec<Message> = calls
                .iter()
                .zip(report.outputs)
                .map(|(tc, output)| {
                    let output = output.unwrap_or_else(|| {
                        ToolOutput::failure(
                            &tc.id,
                            ToolErrorKind::ToolExecutionFailure,
                            "run timed out before the tool finished",
                            Value::Null,
                        )
                    });
                    Message::tool_result(&tc.id, &tc.name, output.content, output.is_error)
                })
                .collect();
            self.memory.append_many(scope, results).await?;

            debug!(step = steps, tool_calls = calls.len(), "step finished");
            let _ = tx
                .send(AgentEvent::StepFinished { step: steps, tool_calls: calls.len() })
                .await;

            if report.timed_out {
                break RunOutcome::TimedOut { partial_text, steps };
            }
        };

        info!(agent = %self.name, thread = %scope, outcome = outcome.label(), steps = outcome.steps(), "run finished");
        let _ = tx.send(AgentEvent::RunFinished(outcome.clone())).await;
        Ok(outcome)
    }
}

/// Both an explicit send and a dropped sender count as cancellation.
fn is_cancelled(cancel: &mut oneshot::Receiver<()>) -> bool {
    !matches!(cancel.try_recv(), Err(oneshot::error::TryRecvError::Empty))
}
