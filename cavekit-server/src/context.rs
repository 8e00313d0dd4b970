//! The context bag plugins share during startup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use cavekit_core::{Cave, TomeManager};
use cavekit_store::PersistenceRegistry;
use cavekit_types::TomeConfig;

use crate::monitor::ResourceMonitor;
use crate::shell::AppShellRegistry;

/// A typed reference cell: a producer plugin sets it, consumer plugins
/// listed later read it.
///
/// Write-once is a convention, not an enforcement; `set` overwrites.
/// `get` answers `None` until a producer has run, which is exactly what
/// a consumer listed too early observes. Consumers must handle that.
pub struct SlotCell<T> {
    slot: RwLock<Option<Arc<T>>>,
}

impl<T> SlotCell<T> {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    pub fn set(&self, value: Arc<T>) {
        *self.slot.write() = Some(value);
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.slot.read().is_some()
    }
}

impl<T> Default for SlotCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Named feature toggles a deployment exposes to its adapters.
/// Unmentioned sections are off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sections(HashMap<String, bool>);

impl Sections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style enable, for tests and hand-built deployments.
    pub fn enable(mut self, name: impl Into<String>) -> Self {
        self.0.insert(name.into(), true);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, on: bool) {
        self.0.insert(name.into(), on);
    }

    pub fn enabled(&self, name: &str) -> bool {
        self.0.get(name).copied().unwrap_or(false)
    }

    /// True when at least one of `names` is enabled.
    pub fn any_enabled<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> bool {
        names.into_iter().any(|name| self.enabled(name))
    }
}

impl From<HashMap<String, bool>> for Sections {
    fn from(map: HashMap<String, bool>) -> Self {
        Self(map)
    }
}

/// Everything `create_cave_server` hands each plugin's `apply`.
///
/// `tome_manager` and `app_shells` exist so producer plugins (typically
/// the host adapter) can expose what they build to plugins applied after
/// them; ordering in the plugin list is the only sequencing there is.
pub struct CaveServerContext {
    pub cave: Arc<Cave>,
    pub tome_configs: Vec<TomeConfig>,
    pub variables: HashMap<String, String>,
    pub sections: Sections,
    pub store: Option<Arc<PersistenceRegistry>>,
    pub monitor: Arc<dyn ResourceMonitor>,
    pub tome_manager: SlotCell<TomeManager>,
    pub app_shells: AppShellRegistry,
}

impl std::fmt::Debug for CaveServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaveServerContext")
            .field("cave", &self.cave.name())
            .field("tome_configs", &self.tome_configs)
            .field("variables", &self.variables)
            .field("sections", &self.sections)
            .finish_non_exhaustive()
    }
}

impl CaveServerContext {
    /// The tome config with the given id, if the deployment carries one.
    pub fn tome_config(&self, id: &str) -> Option<&TomeConfig> {
        self.tome_configs.iter().find(|config| config.id == id)
    }
}
