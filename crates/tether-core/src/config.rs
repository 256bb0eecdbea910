//! Project configuration.
//!
//! Loaded from `.tether/config.toml` under the project root. Every section
//! is optional; a missing file yields the defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::entity::StaticModuleRegistry;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub modules: ModulesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

/// Site module topology: which modules are installed and which module
/// provides each entity type.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModulesConfig {
    #[serde(default)]
    pub active: BTreeSet<String>,
    #[serde(default)]
    pub providers: BTreeMap<String, String>,
}

impl ModulesConfig {
    /// Build the registry the calculator consumes. Provider modules are
    /// implicitly active.
    #[must_use]
    pub fn registry(&self) -> StaticModuleRegistry {
        let mut active = self.active.clone();
        active.extend(self.providers.values().cloned());
        StaticModuleRegistry::new(self.providers.clone(), active)
    }
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(".tether/config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".tether/cache.sqlite3")
}
