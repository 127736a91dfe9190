// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/loom/config.toml"));

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/loom/config.toml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("loom/config.toml"));
    }

    paths.push(PathBuf::from(".loom/config.toml"));
    paths.push(PathBuf::from("loom.toml"));

    paths.dedup();
    paths
}

/// Load configuration by merging all discovered TOML files.
/// The `extra` argument may provide an explicit path (e.g. `--config` CLI flag).
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = toml::Value::Table(toml::map::Map::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            merge_toml(&mut merged, read_layer(&path)?);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        merge_toml(&mut merged, read_layer(p)?);
    }

    let config: Config = merged.try_into().context("invalid configuration")?;
    Ok(config)
}

fn read_layer(path: &Path) -> anyhow::Result<toml::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_toml(dst: &mut toml::Value, src: toml::Value) {
    match (dst, src) {
        (toml::Value::Table(d), toml::Value::Table(s)) => {
            for (k, v) in s {
                let entry = d.entry(k).or_insert(toml::Value::Table(toml::map::Map::new()));
                merge_toml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(raw: &str) -> anyhow::Result<PathBuf> {
    let expanded = shellexpand::full(raw)
        .with_context(|| format!("expanding path {raw:?}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn val(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val(r#"x = 1"#);
        merge_toml(&mut dst, val(r#"x = 2"#));
        assert_eq!(dst["x"].as_integer(), Some(2));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val(r#"[agent]
default_agent = "code-generation"
max_steps = 10"#);
        let src = val(r#"[agent]
max_steps = 3"#);
        merge_toml(&mut dst, src);
        assert_eq!(dst["agent"]["default_agent"].as_str(), Some("code-generation"));
        assert_eq!(dst["agent"]["max_steps"].as_integer(), Some(3));
    }

    #[test]
    fn load_missing_explicit_path_is_error() {
        let result = load(Some(Path::new("/tmp/loom_nonexistent_config_xyz.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn load_explicit_file_overrides_defaults() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, r#"[model]
provider = "mock"
name = "test-model"

[memory]
backend = "memory""#).unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.model.provider, "mock");
        assert_eq!(cfg.model.name, "test-model");
        assert_eq!(cfg.memory.backend, crate::MemoryBackend::Memory);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.tools.output_dir, "out");
    }

    #[test]
    fn partial_model_section_keeps_field_defaults() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[model]\nprovider = \"openai\"\nname = \"gpt-4o-mini\"").unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.model.name, "gpt-4o-mini");
        assert_eq!(cfg.model.api_key_env.as_deref(), Some("OPENAI_API_KEY"));
        assert_eq!(cfg.model.max_tokens, Some(4096));
        assert_eq!(cfg.model.temperature, Some(0.2));

        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[model]\nname = \"gpt-4o-mini\"").unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.model.provider, "openai");
        assert_eq!(cfg.model.name, "gpt-4o-mini");
    }

    #[test]
    fn load_rejects_wrong_types() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[agent]\nmax_steps = \"many\"").unwrap();
        assert!(load(Some(f.path())).is_err());
    }

    #[test]
    fn expand_path_leaves_plain_paths_alone() {
        assert_eq!(expand_path("out/x.db").unwrap(), PathBuf::from("out/x.db"));
    }

    #[test]
    fn expand_path_expands_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/x.db").unwrap(), home.join("x.db"));
        }
    }
}
