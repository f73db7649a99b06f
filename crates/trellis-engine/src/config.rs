//! Engine configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;

/// How the recursive closure reports a handle reached by several routes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecursiveBindings {
    /// Collapse by handle: the first binding set wins.
    #[default]
    First,
    /// Re-emit a visited handle once per distinct binding set (never re-expanding it).
    All,
}

/// Configuration for compilation, optimization and result collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run the optimizer before executing a compiled plan
    pub optimize: bool,
    /// Upper bound on optimizer passes; hitting it means a rewrite cycle
    pub max_optimize_passes: usize,
    /// Binding behaviour of `follow_recursive`
    pub recursive_bindings: RecursiveBindings,
    /// Result limit applied when the caller passes none
    pub default_limit: Option<usize>,
    /// Report alternate binding sets (paths) for each result
    pub include_paths: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            optimize: true,
            max_optimize_passes: 16,
            recursive_bindings: RecursiveBindings::First,
            default_limit: None,
            include_paths: true,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).context("failed to parse engine configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: &FsPath) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_optimize_passes == 0 {
            anyhow::bail!("max_optimize_passes must be at least 1");
        }
        Ok(())
    }
}
