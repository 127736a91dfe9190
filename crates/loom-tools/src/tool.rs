// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

/// Why a tool call produced an error result instead of a normal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    /// The model asked for a tool id that is not registered
    UnknownTool,
    /// The arguments did not match the tool's input schema
    SchemaValidationError,
    /// The tool ran and failed, or its task panicked
    ToolExecutionFailure,
}

impl ToolErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownTool => "UnknownTool",
            Self::SchemaValidationError => "SchemaValidationError",
            Self::ToolExecutionFailure => "ToolExecutionFailure",
        }
    }
}

/// The result of executing a tool.
///
/// `content` is what the model sees.  Built-in tools put a JSON object here;
/// error results always carry an `"error"` field naming the [`ToolErrorKind`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    /// If true, the tool execution failed non-fatally (returned error message).
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful plain-text result.
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: content.into(), is_error: false }
    }

    /// Error result containing a plain-text error message.
    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: msg.into(), is_error: true }
    }

    /// Successful structured result.
    pub fn json(call_id: impl Into<String>, value: &Value) -> Self {
        Self::ok(call_id, value.to_string())
    }

    /// Error result tagged with `kind`.  `details` must be a JSON object (or
    /// `Value::Null`); its fields are merged next to `error` and `message`.
    pub fn failure(
        call_id: impl Into<String>,
        kind: ToolErrorKind,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        let mut body = json!({ "error": kind.as_str(), "message": message.into() });
        if let (Some(obj), Value::Object(extra)) = (body.as_object_mut(), details) {
            for (k, v) in extra {
                obj.entry(k).or_insert(v);
            }
        }
        Self::err(call_id, body.to_string())
    }

    /// The error kind recorded in `content`, if this is a tagged failure.
    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        if !self.is_error {
            return None;
        }
        let v: Value = serde_json::from_str(&self.content).ok()?;
        match v.get("error")?.as_str()? {
            "UnknownTool" => Some(ToolErrorKind::UnknownTool),
            "SchemaValidationError" => Some(ToolErrorKind::SchemaValidationError),
            "ToolExecutionFailure" => Some(ToolErrorKind::ToolExecutionFailure),
            _ => None,
        }
    }
}

/// Trait that every built-in and user-defined tool must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;
    /// Identifies the resource a call with these (validated) arguments
    /// mutates.  Calls in one step that share a key are run one after the
    /// other in request order.  `None` means the call touches nothing shared.
    fn resource_key(&self, _args: &Value) -> Option<String> {
        None
    }
    /// Execute the tool with schema-validated arguments.  Errors should be
    /// wrapped in [`ToolOutput::failure`].
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}
