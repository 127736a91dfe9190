// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// One schema violation, attributed to the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    /// Dotted path of the field (`""` for the argument object itself)
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate tool id: {0}")]
    DuplicateToolId(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {}", join_violations(.violations))]
    SchemaValidation {
        tool: String,
        violations: Vec<FieldViolation>,
    },

    #[error("tool {tool} has an invalid input schema: {reason}")]
    InvalidSchema { tool: String, reason: String },
}

fn join_violations(v: &[FieldViolation]) -> String {
    v.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
