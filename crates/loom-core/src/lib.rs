// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod error;
mod events;
mod step;
mod dispatch;
mod agent;

pub use error::AgentError;
pub use events::AgentEvent;
pub use step::StepResult;
pub use agent::{Agent, RunConfig, RunOutcome};
