// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use loom_tools::ToolCall;

use crate::RunOutcome;

/// Events emitted by the agent during a run.
/// Consumers (the CLI, tests) subscribe to these to drive their output; a
/// closed receiver never affects the run itself.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A model invocation is about to start (1-based)
    StepStarted { step: u32 },
    /// A text chunk streamed from the model
    TextDelta(String),
    /// The full text the model produced in one step
    TextComplete(String),
    /// Token usage reported by the provider for one step
    TokenUsage { input: u32, output: u32 },
    /// The model has requested a tool call
    ToolCallStarted(ToolCall),
    /// A tool call finished
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// All results of a step are in memory
    StepFinished { step: u32, tool_calls: usize },
    /// A recoverable provider warning
    Error(String),
    /// The run is over
    RunFinished(RunOutcome),
}
