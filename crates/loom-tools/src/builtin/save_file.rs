// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{display_path, Workspace};
use crate::tool::{Tool, ToolCall, ToolErrorKind, ToolOutput};
use crate::BuiltinToolId;

pub struct SaveFileTool {
    pub workspace: Workspace,
}

#[derive(Deserialize)]
struct Args {
    filename: String,
    content: String,
    directory: String,
    overwrite: bool,
}

#[async_trait]
impl Tool for SaveFileTool {
    fn name(&self) -> &str { BuiltinToolId::SaveFile.as_str() }

    fn description(&self) -> &str {
        "Save generated code to a file in the output directory. Supports any file type \
         and programming language. Creates missing directories. Set overwrite=false to \
         refuse replacing an existing file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Name of the file to save, with extension (e.g. \"main.py\")"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                },
                "directory": {
                    "type": "string",
                    "default": self.workspace.output_dir,
                    "description": "Directory to save the file in, relative to the workspace"
                },
                "overwrite": {
                    "type": "boolean",
                    "default": true,
                    "description": "Whether to overwrite an existing file"
                }
            },
            "required": ["filename", "content"]
        })
    }

    fn resource_key(&self, args: &Value) -> Option<String> {
        let dir = args.get("directory")?.as_str()?;
        let name = args.get("filename")?.as_str()?;
        Some(display_path(&self.workspace.resolve(&Path::new(dir).join(name))))
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args: Args = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => {
                return ToolOutput::failure(
                    &call.id,
                    ToolErrorKind::ToolExecutionFailure,
                    format!("Failed to save file: {e}"),
                    json!({ "success": false, "filePath": "", "fileSize": 0 }),
                );
            }
        };

        let rel = Path::new(&args.directory).join(&args.filename);
        let file_path = display_path(&rel);
        let target = self.workspace.resolve(&rel);

        debug!(path = %target.display(), overwrite = args.overwrite, "save-file tool");

        if !args.overwrite && tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return ToolOutput::failure(
                &call.id,
                ToolErrorKind::ToolExecutionFailure,
                format!("File {} already exists and overwrite is disabled", args.filename),
                json!({ "success": false, "filePath": file_path, "fileSize": 0 }),
            );
        }

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return save_failed(&call.id, e);
                }
            }
        }

        if let Err(e) = tokio::fs::write(&target, &args.content).await {
            return save_failed(&call.id, e);
        }

        let file_size = match tokio::fs::metadata(&target).await {
            Ok(m) => m.len(),
            Err(e) => return save_failed(&call.id, e),
        };

        ToolOutput::json(&call.id, &json!({
            "success": true,
            "filePath": file_path,
            "message": format!("Successfully saved {} ({file_size} bytes)", args.filename),
            "fileSize": file_size,
        }))
    }
}

fn save_failed(call_id: &str, e: std::io::Error) -> ToolOutput {
    ToolOutput::failure(
        call_id,
        ToolErrorKind::ToolExecutionFailure,
        format!("Failed to save file: {e}"),
        json!({ "success": false, "filePath": "", "fileSize": 0 }),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ToolRegistry;

    fn registry(root: &Path) -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(SaveFileTool { workspace: Workspace::new(root) }).unwrap();
        reg
    }

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "s1".into(), name: "save-file".into(), args }
    }

    fn parse(out: &ToolOutput) -> Value {
        serde_json::from_str(&out.content).unwrap()
    }

    #[tokio::test]
    async fn saves_into_default_out_directory() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let out = reg.execute(&call(json!({"filename": "hello.txt", "content": "hi"}))).await;
        assert!(!out.is_error, "{}", out.content);
        let v = parse(&out);
        assert_eq!(v["success"], true);
        assert_eq!(v["filePath"], "out/hello.txt");
        assert_eq!(v["fileSize"], 2);
        assert_eq!(v["message"], "Successfully saved hello.txt (2 bytes)");
        let written = std::fs::read_to_string(dir.path().join("out/hello.txt")).unwrap();
        assert_eq!(written, "hi");
    }

    #[tokio::test]
    async fn creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let out = reg.execute(&call(json!({
            "filename": "pkg/mod.rs",
            "content": "// mod",
            "directory": "src"
        }))).await;
        assert!(!out.is_error, "{}", out.content);
        assert!(dir.path().join("src/pkg/mod.rs").is_file());
        assert_eq!(parse(&out)["filePath"], "src/pkg/mod.rs");
    }

    #[tokio::test]
    async fn refuses_overwrite_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let first = reg.execute(&call(json!({"filename": "a.txt", "content": "one"}))).await;
        assert!(!first.is_error);

        let second = reg.execute(&call(json!({
            "filename": "a.txt",
            "content": "two",
            "overwrite": false
        }))).await;
        assert_eq!(second.error_kind(), Some(ToolErrorKind::ToolExecutionFailure));
        let v = parse(&second);
        assert_eq!(v["success"], false);
        assert_eq!(v["message"], "File a.txt already exists and overwrite is disabled");
        assert_eq!(std::fs::read_to_string(dir.path().join("out/a.txt")).unwrap(), "one");
    }

    #[tokio::test]
    async fn overwrites_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        reg.execute(&call(json!({"filename": "a.txt", "content": "one"}))).await;
        let out = reg.execute(&call(json!({"filename": "a.txt", "content": "three"}))).await;
        assert!(!out.is_error);
        assert_eq!(std::fs::read_to_string(dir.path().join("out/a.txt")).unwrap(), "three");
    }

    #[tokio::test]
    async fn missing_filename_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let out = reg.execute(&call(json!({"content": "x"}))).await;
        assert_eq!(out.error_kind(), Some(ToolErrorKind::SchemaValidationError));
    }

    #[tokio::test]
    async fn unwritable_target_is_execution_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the directory should be.
        std::fs::write(dir.path().join("out"), "not a dir").unwrap();
        let reg = registry(dir.path());
        let out = reg.execute(&call(json!({"filename": "a.txt", "content": "x"}))).await;
        assert_eq!(out.error_kind(), Some(ToolErrorKind::ToolExecutionFailure));
        assert_eq!(parse(&out)["success"], false);
    }

    #[test]
    fn resource_key_is_resolved_target() {
        let tool = SaveFileTool { workspace: Workspace::new("/w") };
        let key = tool.resource_key(&json!({"filename": "a.txt", "directory": "out"}));
        assert_eq!(key.as_deref(), Some("/w/out/a.txt"));
    }
}
