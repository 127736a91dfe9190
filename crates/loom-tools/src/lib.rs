// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod error;
mod registry;
mod tool;
mod tool_id;
mod builtin;

pub use error::{FieldViolation, RegistryError};
pub use registry::{Dispatch, ToolRegistry, ToolSchema};
pub use tool::{Tool, ToolCall, ToolErrorKind, ToolOutput};
pub use tool_id::BuiltinToolId;
pub use builtin::{
    create_project::CreateProjectTool, list_files::ListFilesTool, save_file::SaveFileTool,
    Workspace,
};
