// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use super::{display_path, Workspace};
use crate::tool::{Tool, ToolCall, ToolErrorKind, ToolOutput};
use crate::BuiltinToolId;

pub struct ListFilesTool {
    pub workspace: Workspace,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Args {
    directory: String,
    recursive: bool,
    file_types: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry {
    name: String,
    path: String,
    size: u64,
    extension: String,
    is_directory: bool,
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str { BuiltinToolId::ListFiles.as_str() }

    fn description(&self) -> &str {
        "List files in a directory to see what has been generated. \
         fileTypes filters files (not directories) by extension, e.g. [\".py\", \".js\"]."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "directory": {
                    "type": "string",
                    "default": self.workspace.output_dir,
                    "description": "Directory to list files from"
                },
                "recursive": {
                    "type": "boolean",
                    "default": false,
                    "description": "Whether to list files recursively"
                },
                "fileTypes": {
                    "type": "array",
                    "items": { "type": "string" },
                    "default": [],
                    "description": "Filter by file extensions (e.g. [\".py\", \".js\"])"
                }
            }
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args: Args = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return list_failed(&call.id, e.to_string()),
        };

        let target = self.workspace.resolve(Path::new(&args.directory));
        debug!(path = %target.display(), recursive = args.recursive, "list-files tool");

        if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return ToolOutput::json(&call.id, &json!({
                "files": [],
                "totalFiles": 0,
                "message": format!("Directory {} does not exist", args.directory),
            }));
        }

        let directory = args.directory.clone();
        let scanned = tokio::task::spawn_blocking(move || {
            scan(&target, Path::new(&directory), args.recursive, &args.file_types)
        })
        .await;

        match scanned {
            Ok(Ok(files)) => ToolOutput::json(&call.id, &json!({
                "totalFiles": files.len(),
                "message": format!("Found {} items in {}", files.len(), args.directory),
                "files": files,
            })),
            Ok(Err(e)) => list_failed(&call.id, e.to_string()),
            Err(e) => list_failed(&call.id, e.to_string()),
        }
    }
}

fn scan(
    root: &Path,
    shown_as: &Path,
    recursive: bool,
    file_types: &[String],
) -> Result<Vec<FileEntry>, walkdir::Error> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        let meta = entry.metadata()?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let extension = extension_of(&name);
        let is_directory = meta.is_dir();

        if !is_directory && !file_types.is_empty() && !matches_type(&extension, file_types) {
            continue;
        }

        let rel: PathBuf = entry.path().strip_prefix(root).unwrap_or(entry.path()).to_path_buf();
        files.push(FileEntry {
            name,
            path: display_path(&shown_as.join(rel)),
            size: meta.len(),
            extension,
            is_directory,
        });
    }
    Ok(files)
}

/// Extension including the leading dot, or `""`.  Dotfiles have none.
fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(i) => name[i..].to_string(),
    }
}

fn matches_type(extension: &str, file_types: &[String]) -> bool {
    file_types.iter().any(|t| {
        let t = t.trim();
        t == extension || (!t.starts_with('.') && extension.strip_prefix('.') == Some(t))
    })
}

fn list_failed(call_id: &str, reason: String) -> ToolOutput {
    ToolOutput::failure(
        call_id,
        ToolErrorKind::ToolExecutionFailure,
        format!("Failed to list files: {reason}"),
        json!({ "files": [], "totalFiles": 0 }),
    )
}
