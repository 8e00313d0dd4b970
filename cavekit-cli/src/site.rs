//! Deployment file loading.
//!
//! One YAML file describes a whole deployment: the cave, its tomes, the
//! enabled sections, and how to listen and persist.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use cavekit_server::Sections;
use cavekit_types::{CaveConfig, TomeConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub cave: CaveConfig,
    #[serde(default)]
    pub tomes: Vec<TomeConfig>,
    #[serde(default)]
    pub sections: Sections,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub store: Option<StoreConfig>,
    #[serde(default)]
    pub permission: Option<PermissionRule>,
    /// Path of the registry route when the `registry` section is on.
    #[serde(default)]
    pub registry_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8378
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Directory backing the `file` persistence adapter.
    pub data_dir: PathBuf,
}

/// Dispatch-route permission gate, as configured.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionRule {
    pub rule: String,
    #[serde(default)]
    pub level_order: Option<Vec<String>>,
}

impl SiteConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: SiteConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }
}
