// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

use loom_memory::MemoryError;

/// Failures that abort a run.
///
/// Tool-level problems (unknown tool, invalid arguments, a failing or
/// panicking tool) never show up here; they are fed back to the model as
/// tool results and the run continues.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}
