// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Agent construction factory.
//!
//! Everything a frontend needs is built here once, at process start:
//! - the model provider and memory store selected by configuration
//! - one tool registry per agent profile
//! - fully wired [`loom_core::Agent`] values
//!
//! The binary holds a single [`Runtime`] and passes it by reference; there
//! is no process-wide singleton.

pub mod registry;
pub mod runtime;

pub use registry::build_tool_registry;
pub use runtime::Runtime;
