// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! [`Runtime`]: the composition root.
//!
//! Built once from a [`Config`]; hands out [`Agent`]s by profile name and
//! the matching [`RunConfig`] for each run.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tracing::info;

use loom_config::{AgentProfile, Config};
use loom_core::{Agent, RunConfig};
use loom_memory::{MemoryStore, ThreadKey};
use loom_model::ModelProvider;
use loom_tools::Workspace;

use crate::registry::build_tool_registry;

pub struct Runtime {
    config: Arc<Config>,
    model: Arc<dyn ModelProvider>,
    memory: Arc<dyn MemoryStore>,
    workspace: Workspace,
}

impl Runtime {
    /// Build the model provider, memory store and workspace named by `config`.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let model: Arc<dyn ModelProvider> = Arc::from(
            loom_model::from_config(&config.model).context("building model provider")?,
        );
        let memory = loom_memory::from_config(&config.memory).context("opening memory store")?;
        info!(
            provider = model.name(),
            model = model.model_name(),
            memory = ?config.memory.backend,
            "runtime ready"
        );
        Self::with_parts(config, model, memory)
    }

    /// Assemble a runtime from already-built parts.  Tests use this to
    /// inject scripted providers.
    pub fn with_parts(
        config: Config,
        model: Arc<dyn ModelProvider>,
        memory: Arc<dyn MemoryStore>,
    ) -> anyhow::Result<Self> {
        let mut workspace = Workspace::from_config(&config.tools);
        workspace.root = loom_config::expand_path(&config.tools.workspace_root)
            .context("resolving tools.workspace_root")?;
        Ok(Self { config: Arc::new(config), model, memory, workspace })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn model(&self) -> &Arc<dyn ModelProvider> {
        &self.model
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.memory
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Look up a profile, falling back to `agent.default_agent` when `name`
    /// is `None`.
    pub fn profile(&self, name: Option<&str>) -> anyhow::Result<(String, AgentProfile)> {
        let name = name.unwrap_or(self.config.agent.default_agent.as_str());
        self.config
            .agent_profile(name)
            .map(|p| (name.to_string(), p))
            .ok_or_else(|| {
                let known: Vec<String> = self.config.agent_profiles().into_keys().collect();
                anyhow!("unknown agent '{name}' (available: {})", known.join(", "))
            })
    }

    /// Build the agent for profile `name`, each with its own tool registry
    /// over the shared model and memory.
    pub fn agent(&self, name: Option<&str>) -> anyhow::Result<Agent> {
        let (name, profile) = self.profile(name)?;
        let tools = build_tool_registry(&self.workspace, profile.tools.as_slice())
            .with_context(|| format!("building tools for agent '{name}'"))?;
        let instructions = self
            .config
            .agent
            .system_prompt
            .clone()
            .unwrap_or(profile.instructions);
        Ok(Agent::new(
            name,
            instructions,
            Arc::clone(&self.model),
            Arc::new(tools),
            Arc::clone(&self.memory),
        ))
    }

    /// Step budget and timeout for a run of profile `name`.  Explicit
    /// overrides win over the profile and the `[agent]` section.
    pub fn run_config(
        &self,
        name: Option<&str>,
        scope: ThreadKey,
        max_steps: Option<u32>,
        timeout: Option<Duration>,
    ) -> anyhow::Result<RunConfig> {
        let (_, profile) = self.profile(name)?;
        let steps = max_steps.unwrap_or_else(|| profile.effective_max_steps(&self.config.agent));
        let timeout = timeout.or(match self.config.agent.run_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        });
        Ok(RunConfig::new(scope, steps).with_timeout(timeout))
    }
}
