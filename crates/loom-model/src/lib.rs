// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod types;
mod provider;
mod openai;
mod mock;

pub use types::*;
pub use provider::{ModelProvider, ResponseStream};
pub use openai::OpenAiProvider;
pub use mock::{text_script, tool_call_script, MockProvider, ScriptedMockProvider};

use anyhow::bail;
use loom_config::ModelConfig;

/// Construct a boxed [`ModelProvider`] from configuration.
///
/// Provider selection:
/// - `"openai"` → [`OpenAiProvider`]
/// - `"mock"` → [`MockProvider`] (echo-back)
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    match cfg.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiProvider::new(
            cfg.name.clone(),
            resolve_api_key(cfg),
            cfg.base_url.clone(),
            cfg.max_tokens,
            cfg.temperature,
        ))),
        "mock" => Ok(Box::new(MockProvider)),
        other => bail!("unknown model provider: {other}"),
    }
}

fn resolve_api_key(cfg: &ModelConfig) -> Option<String> {
    if let Some(k) = &cfg.api_key {
        return Some(k.clone());
    }
    if let Some(env) = &cfg.api_key_env {
        return std::env::var(env).ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_selects_provider() {
        let mut cfg = ModelConfig { provider: "mock".into(), ..ModelConfig::default() };
        assert_eq!(from_config(&cfg).unwrap().name(), "mock");

        cfg.provider = "openai".into();
        let p = from_config(&cfg).unwrap();
        assert_eq!(p.name(), "openai");
        assert_eq!(p.model_name(), "gpt-4o");
    }

    #[test]
    fn from_config_rejects_unknown_provider() {
        let cfg = ModelConfig { provider: "carrier-pigeon".into(), ..ModelConfig::default() };
        let err = from_config(&cfg).err().unwrap();
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn explicit_api_key_wins_over_env() {
        let cfg = ModelConfig {
            api_key: Some("explicit".into()),
            api_key_env: Some("LOOM_TEST_UNSET_KEY_VAR".into()),
            ..ModelConfig::default()
        };
        assert_eq!(resolve_api_key(&cfg).as_deref(), Some("explicit"));
    }
}
