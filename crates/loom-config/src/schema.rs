// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of the profile used when neither the CLI nor the config picks one.
pub const DEFAULT_AGENT: &str = "universal-code";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    /// User-defined agent profiles.
    ///
    /// Entries here are layered on top of the built-in profiles returned by
    /// [`builtin_profiles`]; a user profile with a built-in name replaces it.
    ///
    /// ```toml
    /// [agents.html-only]
    /// description = "Writes single-file HTML pages"
    /// instructions = "You write self-contained HTML files."
    /// tools = ["save-file"]
    /// max_steps = 4
    /// ```
    #[serde(default)]
    pub agents: BTreeMap<String, AgentProfile>,
}

impl Config {
    /// Built-in profiles merged with the ones declared under `[agents]`.
    pub fn agent_profiles(&self) -> BTreeMap<String, AgentProfile> {
        let mut profiles = builtin_profiles();
        for (name, profile) in &self.agents {
            profiles.insert(name.clone(), profile.clone());
        }
        profiles
    }

    /// Look up a single profile by name, built-in or user-defined.
    pub fn agent_profile(&self, name: &str) -> Option<AgentProfile> {
        self.agent_profiles().remove(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider identifier: "openai" | "mock"
    pub provider: String,
    /// Model name forwarded to the provider API
    pub name: String,
    /// Environment variable that holds the API key (read at runtime)
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files
    pub api_key: Option<String>,
    /// Base URL override for OpenAI-compatible proxies and local servers
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0)
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            api_key_env: Some("OPENAI_API_KEY".into()),
            api_key: None,
            base_url: None,
            max_tokens: Some(4096),
            temperature: Some(0.2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Profile used by `loom run` when `--agent` is not given
    #[serde(default = "default_agent_name")]
    pub default_agent: String,
    /// Step budget for profiles that do not declare their own
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Total run wall-clock timeout in seconds (0 = no limit)
    #[serde(default)]
    pub run_timeout_secs: u64,
    /// Replaces the selected profile's instructions when set
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_agent_name() -> String {
    DEFAULT_AGENT.to_string()
}

fn default_max_steps() -> u32 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_agent: default_agent_name(),
            max_steps: default_max_steps(),
            run_timeout_secs: 0,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    /// Process-local; history is lost on exit
    Memory,
    /// SQLite database file at `memory.path`
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub backend: MemoryBackend,
    /// Database file for the sqlite backend; `~` and `$VAR` are expanded
    #[serde(default = "default_memory_path")]
    pub path: String,
}

fn default_memory_path() -> String {
    ".loom/memory.db".to_string()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { backend: MemoryBackend::default(), path: default_memory_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Directory that relative tool paths resolve against
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,
    /// Default target directory of `save-file` and `list-files`
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Default parent directory of `create-project`
    #[serde(default = "default_projects_dir")]
    pub projects_dir: String,
}

fn default_workspace_root() -> String {
    ".".to_string()
}

fn default_output_dir() -> String {
    "out".to_string()
}

fn default_projects_dir() -> String {
    "./generated-projects".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            output_dir: default_output_dir(),
            projects_dir: default_projects_dir(),
        }
    }
}

/// A named bundle of instructions, tools and step budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    #[serde(default)]
    pub description: String,
    pub instructions: String,
    /// Tool ids made available to the model
    #[serde(default)]
    pub tools: Vec<String>,
    /// Overrides `agent.max_steps` for this profile
    #[serde(default)]
    pub max_steps: Option<u32>,
}

impl AgentProfile {
    pub fn effective_max_steps(&self, agent: &AgentConfig) -> u32 {
        self.max_steps.unwrap_or(agent.max_steps)
    }
}

/// Profiles shipped with loom.
pub fn builtin_profiles() -> BTreeMap<String, AgentProfile> {
    let mut m = BTreeMap::new();
    m.insert(
        "code-generation".to_string(),
        AgentProfile {
            description: "Builds small HTML/CSS/JavaScript web projects".into(),
            instructions: "You are a web development assistant. When asked to build a page \
                or small app, write the HTML, CSS and JavaScript yourself and call \
                create-project once with all three so the user gets a runnable folder. \
                Use save-file for single extra files. Keep the code modern, accessible \
                and commented where it helps. Finish with a short summary of what was \
                written and where."
                .into(),
            tools: vec!["create-project".into(), "save-file".into()],
            max_steps: Some(10),
        },
    );
    m.insert(
        "universal-code".to_string(),
        AgentProfile {
            description: "Writes code in any language and saves it to disk".into(),
            instructions: "You are a programming assistant for any language. Write the \
                requested code, then save every file with save-file using a sensible \
                filename and extension. Use list-files to check what already exists \
                before overwriting. Reply with a brief explanation and the saved paths."
                .into(),
            tools: vec!["save-file".into(), "list-files".into(), "create-project".into()],
            max_steps: Some(15),
        },
    );
    m
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
