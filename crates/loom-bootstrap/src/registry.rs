// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Centralised tool-registry builder.
//!
//! Agent profiles name their tools by id; this is the single place where an
//! id turns into a registered tool.

use anyhow::{anyhow, Context};
use tracing::debug;

use loom_tools::{
    BuiltinToolId, CreateProjectTool, ListFilesTool, SaveFileTool, ToolRegistry, Workspace,
};

/// Build a [`ToolRegistry`] holding the built-in tools named in `tool_ids`.
///
/// An id that names no built-in tool, or appears twice, is a configuration
/// error.
pub fn build_tool_registry<S: AsRef<str>>(
    workspace: &Workspace,
    tool_ids: &[S],
) -> anyhow::Result<ToolRegistry> {
    let mut reg = ToolRegistry::new();
    for raw in tool_ids {
        let raw = raw.as_ref();
        let id = BuiltinToolId::try_from(raw).map_err(|_| {
            let known: Vec<&str> = BuiltinToolId::ALL.iter().map(|t| t.as_str()).collect();
            anyhow!("unknown tool '{raw}' (built-in tools: {})", known.join(", "))
        })?;
        let ws = workspace.clone();
        let registered = match id {
            BuiltinToolId::SaveFile => reg.register(SaveFileTool { workspace: ws }),
            BuiltinToolId::ListFiles => reg.register(ListFilesTool { workspace: ws }),
            BuiltinToolId::CreateProject => reg.register(CreateProjectTool { workspace: ws }),
        };
        registered.with_context(|| format!("registering tool '{raw}'"))?;
        debug!(tool = raw, "tool enabled");
    }
    Ok(reg)
}
