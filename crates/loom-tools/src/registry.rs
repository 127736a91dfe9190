// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use jsonschema::error::ValidationErrorKind;
use serde_json::{json, Value};
use tracing::debug;

use crate::{FieldViolation, RegistryError, Tool, ToolCall, ToolErrorKind, ToolOutput};

/// A tool schema – mirrors loom_model::ToolSchema but keeps the tools crate
/// independent from the model crate.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Outcome of resolving a tool id requested by the model.
#[derive(Clone)]
pub enum Dispatch {
    Tool(Arc<dyn Tool>),
    UnknownTool(String),
}

struct Entry {
    tool: Arc<dyn Tool>,
    schema: Value,
    validator: Arc<jsonschema::Validator>,
}

/// Central registry holding all available tools.
///
/// Schemas are compiled once at registration; the registry is immutable
/// afterwards and shared between concurrent tool tasks behind an `Arc`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Entry>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateToolId(name));
        }
        let schema = tool.parameters_schema();
        let validator = jsonschema::Validator::new(&schema).map_err(|e| {
            RegistryError::InvalidSchema { tool: name.clone(), reason: e.to_string() }
        })?;
        debug!(tool = %name, "registered tool");
        self.tools.insert(name, Entry { tool, schema, validator: Arc::new(validator) });
        Ok(())
    }

    /// Look up a tool by id.  Repeated lookups return the same `Arc`.
    pub fn lookup(&self, id: &str) -> Result<Arc<dyn Tool>, RegistryError> {
        self.tools
            .get(id)
            .map(|e| Arc::clone(&e.tool))
            .ok_or_else(|| RegistryError::UnknownTool(id.to_string()))
    }

    pub fn resolve(&self, id: &str) -> Dispatch {
        match self.lookup(id) {
            Ok(tool) => Dispatch::Tool(tool),
            Err(_) => Dispatch::UnknownTool(id.to_string()),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tools.contains_key(id)
    }

    /// Validate raw model arguments against the tool's input schema.
    ///
    /// Missing top-level properties that declare a `default` are filled in
    /// before validation, so the returned value is what the tool executes
    /// with.  On failure every violating field is reported.
    pub fn validate_input(&self, id: &str, raw: &Value) -> Result<Value, RegistryError> {
        let entry = self
            .tools
            .get(id)
            .ok_or_else(|| RegistryError::UnknownTool(id.to_string()))?;

        let args = apply_defaults(&entry.schema, raw);
        let violations: Vec<FieldViolation> =
            entry.validator.iter_errors(&args).map(|e| violation(&e)).collect();
        if violations.is_empty() {
            Ok(args)
        } else {
            Err(RegistryError::SchemaValidation { tool: id.to_string(), violations })
        }
    }

    /// The resource a call would touch, if its arguments are valid.
    pub fn resource_key(&self, call: &ToolCall) -> Option<String> {
        let tool = self.lookup(&call.name).ok()?;
        let args = self.validate_input(&call.name, &call.args).ok()?;
        tool.resource_key(&args)
    }

    /// Resolve, validate and run one call.  Never fails: unknown ids and
    /// invalid arguments become tagged error outputs the model can read.
    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let tool = match self.resolve(&call.name) {
            Dispatch::Tool(t) => t,
            Dispatch::UnknownTool(name) => {
                return ToolOutput::failure(
                    &call.id,
                    ToolErrorKind::UnknownTool,
                    format!("unknown tool: {name}"),
                    json!({ "available": self.names() }),
                );
            }
        };

        let args = match self.validate_input(&call.name, &call.args) {
            Ok(a) => a,
            Err(RegistryError::SchemaValidation { violations, .. }) => {
                return ToolOutput::failure(
                    &call.id,
                    ToolErrorKind::SchemaValidationError,
                    format!("invalid arguments for {}", call.name),
                    json!({ "violations": violations }),
                );
            }
            Err(e) => {
                return ToolOutput::failure(
                    &call.id,
                    ToolErrorKind::ToolExecutionFailure,
                    e.to_string(),
                    Value::Null,
                );
            }
        };

        let validated = ToolCall { id: call.id.clone(), name: call.name.clone(), args };
        tool.execute(&validated).await
    }

    /// Produce schemas for all registered tools, sorted by name.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|e| ToolSchema {
            name: e.tool.name().to_string(),
            description: e.tool.description().to_string(),
            parameters: e.schema.clone(),
        }).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn apply_defaults(schema: &Value, raw: &Value) -> Value {
    let mut args = raw.clone();
    if let (Some(obj), Some(props)) = (
        args.as_object_mut(),
        schema.get("properties").and_then(Value::as_object),
    ) {
        for (key, prop) in props {
            if let Some(default) = prop.get("default") {
                obj.entry(key.clone()).or_insert_with(|| default.clone());
            }
        }
    }
    args
}

fn violation(e: &jsonschema::ValidationError<'_>) -> FieldViolation {
    let pointer = e.instance_path.to_string();
    let mut field = pointer.trim_start_matches('/').replace('/', ".");
    // `required` errors point at the parent object; name the missing field.
    if let ValidationErrorKind::Required { property } = &e.kind {
        let missing = property.as_str().map(str::to_string).unwrap_or_else(|| property.to_string());
        field = if field.is_empty() { missing } else { format!("{field}.{missing}") };
    }
    FieldViolation { field, message: e.to_string() }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;

    /// Minimal tool for registry tests.
    struct EchoTool { name: &'static str }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { self.name }
        fn description(&self) -> &str { "echoes its input" }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "times": { "type": "integer", "minimum": 1, "default": 1 }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("echo:{}", call.args))
        }
    }

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" }).unwrap();
        reg
    }

    #[test]
    fn register_duplicate_id_fails() {
        let mut reg = registry();
        let err = reg.register(EchoTool { name: "echo" }).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateToolId(ref n) if n == "echo"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn debug_lists_tool_names() {
        assert_eq!(format!("{:?}", registry()), r#"ToolRegistry { tools: ["echo"] }"#);
    }

    #[test]
    fn lookup_is_idempotent() {
        let reg = registry();
        let a = reg.lookup("echo").unwrap();
        let b = reg.lookup("echo").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn lookup_unknown_fails() {
        let reg = registry();
        assert!(matches!(reg.lookup("nope"), Err(RegistryError::UnknownTool(n)) if n == "nope"));
        assert!(matches!(reg.resolve("nope"), Dispatch::UnknownTool(n) if n == "nope"));
    }

    #[test]
    fn validate_fills_defaults() {
        let reg = registry();
        let v = reg.validate_input("echo", &json!({"text": "hi"})).unwrap();
        assert_eq!(v, json!({"text": "hi", "times": 1}));
    }

    #[test]
    fn validate_lists_every_violation() {
        let reg = registry();
        let err = reg.validate_input("echo", &json!({"times": 0})).unwrap_err();
        match err {
            RegistryError::SchemaValidation { tool, violations } => {
                assert_eq!(tool, "echo");
                let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
                assert!(fields.contains(&"text"), "{violations:?}");
                assert!(fields.contains(&"times"), "{violations:?}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_non_object_arguments() {
        let reg = registry();
        assert!(reg.validate_input("echo", &json!("text")).is_err());
    }

    #[test]
    fn invalid_schema_is_rejected_at_registration() {
        struct Broken;
        #[async_trait]
        impl Tool for Broken {
            fn name(&self) -> &str { "broken" }
            fn description(&self) -> &str { "" }
            fn parameters_schema(&self) -> Value { json!({ "type": 12 }) }
            async fn execute(&self, call: &ToolCall) -> ToolOutput { ToolOutput::ok(&call.id, "") }
        }
        let mut reg = ToolRegistry::new();
        assert!(matches!(reg.register(Broken), Err(RegistryError::InvalidSchema { .. })));
    }

    #[test]
    fn schemas_sorted_by_name() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "b" }).unwrap();
        reg.register(EchoTool { name: "a" }).unwrap();
        let names: Vec<String> = reg.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn execute_known_tool_passes_validated_args() {
        let reg = registry();
        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({"text": "x"}) };
        let out = reg.execute(&call).await;
        assert!(!out.is_error);
        assert!(out.content.contains("\"times\":1"), "{}", out.content);
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_tagged_error() {
        let reg = registry();
        let call = ToolCall { id: "x".into(), name: "missing".into(), args: json!({}) };
        let out = reg.execute(&call).await;
        assert_eq!(out.error_kind(), Some(ToolErrorKind::UnknownTool));
        assert!(out.content.contains("echo"), "lists available tools: {}", out.content);
    }

    #[tokio::test]
    async fn execute_invalid_args_returns_tagged_error() {
        let reg = registry();
        let call = ToolCall { id: "x".into(), name: "echo".into(), args: json!({}) };
        let out = reg.execute(&call).await;
        assert_eq!(out.error_kind(), Some(ToolErrorKind::SchemaValidationError));
        assert!(out.content.contains("\"field\":\"text\""), "{}", out.content);
    }
}
