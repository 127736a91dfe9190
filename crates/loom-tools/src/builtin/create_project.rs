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

pub struct CreateProjectTool {
    pub workspace: Workspace,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Args {
    project_name: String,
    html_content: String,
    css_content: String,
    js_content: String,
    output_path: String,
}

#[async_trait]
impl Tool for CreateProjectTool {
    fn name(&self) -> &str { BuiltinToolId::CreateProject.as_str() }

    fn description(&self) -> &str {
        "Create a complete web project with index.html, styles.css, script.js and a \
         README.md inside <outputPath>/<projectName>."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "projectName": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Name of the project directory"
                },
                "htmlContent": { "type": "string", "description": "HTML content to write" },
                "cssContent": { "type": "string", "description": "CSS content to write" },
                "jsContent": { "type": "string", "description": "JavaScript content to write" },
                "outputPath": {
                    "type": "string",
                    "default": self.workspace.projects_dir,
                    "description": "Base path for project creation"
                }
            },
            "required": ["projectName", "htmlContent", "cssContent", "jsContent"]
        })
    }

    fn resource_key(&self, args: &Value) -> Option<String> {
        let base = args.get("outputPath")?.as_str()?;
        let name = args.get("projectName")?.as_str()?;
        Some(display_path(&self.workspace.resolve(&Path::new(base).join(name))))
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args: Args = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return project_failed(&call.id, e.to_string()),
        };

        let rel = Path::new(&args.output_path).join(&args.project_name);
        let project_path = display_path(&rel);
        let target = self.workspace.resolve(&rel);
        debug!(path = %target.display(), "create-project tool");

        if let Err(e) = tokio::fs::create_dir_all(&target).await {
            return project_failed(&call.id, e.to_string());
        }

        let readme = readme(&args.project_name);
        let files: [(&str, &str); 4] = [
            ("index.html", &args.html_content),
            ("styles.css", &args.css_content),
            ("script.js", &args.js_content),
            ("README.md", &readme),
        ];

        let mut written = Vec::with_capacity(files.len());
        for (name, content) in files {
            if let Err(e) = tokio::fs::write(target.join(name), content).await {
                return project_failed(&call.id, format!("{name}: {e}"));
            }
            written.push(name);
        }

        ToolOutput::json(&call.id, &json!({
            "projectPath": project_path,
            "files": written,
            "success": true,
            "message": format!(
                "Project \"{}\" created successfully at {project_path}",
                args.project_name
            ),
        }))
    }
}

fn readme(project_name: &str) -> String {
    format!(
        "# {project_name}\n\n\
         A web project generated by loom.\n\n\
         ## Files\n\
         - `index.html` - Main HTML file\n\
         - `styles.css` - CSS styles\n\
         - `script.js` - JavaScript functionality\n\n\
         ## How to use\n\
         1. Open `index.html` in your web browser\n\
         2. Or serve the files with a local web server\n\n\
         Generated on: {}\n",
        chrono::Utc::now().to_rfc3339()
    )
}

fn project_failed(call_id: &str, reason: String) -> ToolOutput {
    ToolOutput::failure(
        call_id,
        ToolErrorKind::ToolExecutionFailure,
        format!("Failed to create project: {reason}"),
        json!({ "projectPath": "", "files": [], "success": false }),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ToolRegistry;

    fn registry(root: &Path) -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(CreateProjectTool { workspace: Workspace::new(root) }).unwrap();
        reg
    }

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "p1".into(), name: "create-project".into(), args }
    }

    #[tokio::test]
    async fn writes_all_four_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = registry(dir.path()).execute(&call(json!({
            "projectName": "todo",
            "htmlContent": "<html></html>",
            "cssContent": "body{}",
            "jsContent": "console.log(1)"
        }))).await;
        assert!(!out.is_error, "{}", out.content);

        let v: Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(v["projectPath"], "generated-projects/todo");
        assert_eq!(v["files"], json!(["index.html", "styles.css", "script.js", "README.md"]));

        let base = dir.path().join("generated-projects/todo");
        assert_eq!(std::fs::read_to_string(base.join("styles.css")).unwrap(), "body{}");
        let readme = std::fs::read_to_string(base.join("README.md")).unwrap();
        assert!(readme.starts_with("# todo\n"));
    }

    #[tokio::test]
    async fn missing_content_fields_are_all_reported() {
        let dir = tempfile::tempdir().unwrap();
        let out = registry(dir.path())
            .execute(&call(json!({"projectName": "x"})))
            .await;
        assert_eq!(out.error_kind(), Some(ToolErrorKind::SchemaValidationError));
        for field in ["htmlContent", "cssContent", "jsContent"] {
            assert!(out.content.contains(field), "{field} missing from {}", out.content);
        }
    }

    #[test]
    fn resource_key_is_project_dir() {
        let tool = CreateProjectTool { workspace: Workspace::new("/w") };
        let key = tool.resource_key(&json!({"projectName": "p", "outputPath": "site"}));
        assert_eq!(key.as_deref(), Some("/w/site/p"));
    }
}
