// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod create_project;
pub mod list_files;
pub mod save_file;

use std::path::{Component, Path, PathBuf};

use loom_config::ToolsConfig;

/// Filesystem context shared by the built-in tools.
///
/// Relative directories given by the model resolve against `root`; paths
/// reported back to the model stay relative so transcripts do not depend on
/// where loom runs.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub output_dir: String,
    pub projects_dir: String,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let defaults = ToolsConfig::default();
        Self {
            root: root.into(),
            output_dir: defaults.output_dir,
            projects_dir: defaults.projects_dir,
        }
    }

    pub fn from_config(cfg: &ToolsConfig) -> Self {
        Self {
            root: PathBuf::from(&cfg.workspace_root),
            output_dir: cfg.output_dir.clone(),
            projects_dir: cfg.projects_dir.clone(),
        }
    }

    /// Resolve a model-supplied path against the workspace root.
    pub fn resolve(&self, rel: &Path) -> PathBuf {
        if rel.is_absolute() {
            rel.to_path_buf()
        } else {
            self.root.join(rel)
        }
    }
}

/// Render a path with forward slashes for tool output, without `.`
/// components.
pub(crate) fn display_path(p: &Path) -> String {
    let cleaned: PathBuf = p
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if cleaned.as_os_str().is_empty() {
        return ".".to_string();
    }
    cleaned.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_joins_relative_paths() {
        let ws = Workspace::new("/srv/loom");
        assert_eq!(ws.resolve(Path::new("out/a.txt")), PathBuf::from("/srv/loom/out/a.txt"));
        assert_eq!(ws.resolve(Path::new("/tmp/a.txt")), PathBuf::from("/tmp/a.txt"));
    }

    #[test]
    fn display_path_drops_current_dir_components() {
        assert_eq!(display_path(Path::new("./generated-projects/todo")), "generated-projects/todo");
        assert_eq!(display_path(Path::new("out/./a.txt")), "out/a.txt");
        assert_eq!(display_path(Path::new(".")), ".");
    }

    #[test]
    fn defaults_match_config_defaults() {
        let ws = Workspace::new(".");
        assert_eq!(ws.output_dir, "out");
        assert_eq!(ws.projects_dir, "./generated-projects");
    }
}
