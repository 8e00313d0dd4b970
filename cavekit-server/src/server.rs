//! Startup: turn a cave, its tomes and a plugin list into a running
//! deployment context.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use cavekit_core::Cave;
use cavekit_store::PersistenceRegistry;
use cavekit_types::TomeConfig;

use crate::adapter::{AdapterCapabilities, ServerAdapter};
use crate::context::{CaveServerContext, Sections, SlotCell};
use crate::error::ServerError;
use crate::monitor::{InMemoryResourceMonitor, ResourceMonitor};
use crate::shell::AppShellRegistry;

/// Everything a deployment is made of.
pub struct CaveServerSpec {
    pub cave: Arc<Cave>,
    pub tome_configs: Vec<TomeConfig>,
    pub variables: HashMap<String, String>,
    pub sections: Sections,
    pub store: Option<Arc<PersistenceRegistry>>,
    pub monitor: Option<Arc<dyn ResourceMonitor>>,
    pub plugins: Vec<Arc<dyn ServerAdapter>>,
}

impl CaveServerSpec {
    pub fn new(cave: Arc<Cave>) -> Self {
        Self {
            cave,
            tome_configs: Vec::new(),
            variables: HashMap::new(),
            sections: Sections::new(),
            store: None,
            monitor: None,
            plugins: Vec::new(),
        }
    }

    pub fn with_tomes(mut self, tome_configs: Vec<TomeConfig>) -> Self {
        self.tome_configs = tome_configs;
        self
    }

    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_sections(mut self, sections: Sections) -> Self {
        self.sections = sections;
        self
    }

    pub fn with_store(mut self, store: Arc<PersistenceRegistry>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn ResourceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Appends a plugin. Order matters: `apply` runs strictly in this
    /// order, and reference cells flow producer-to-consumer along it.
    pub fn with_plugin(mut self, plugin: Arc<dyn ServerAdapter>) -> Self {
        self.plugins.push(plugin);
        self
    }
}

/// Initializes the cave (exactly once), builds the shared context, and
/// applies every plugin sequentially in list order.
///
/// The first `apply` error aborts startup; remaining plugins never run.
/// On success the context is returned so the host owns whatever the
/// plugins published into it.
pub async fn create_cave_server(spec: CaveServerSpec) -> Result<CaveServerContext, ServerError> {
    spec.cave.initialize().await;
    let monitor = spec
        .monitor
        .unwrap_or_else(|| Arc::new(InMemoryResourceMonitor::new()));
    if let Some(store) = &spec.store {
        // Surface build-time persistence degradations through the monitor.
        for event in store.fallback_events() {
            monitor.record_fallback(&event.tome_id, &event.requested, &event.fallen_back_to);
        }
    }
    let context = CaveServerContext {
        cave: spec.cave,
        tome_configs: spec.tome_configs,
        variables: spec.variables,
        sections: spec.sections,
        store: spec.store,
        monitor,
        tome_manager: SlotCell::new(),
        app_shells: AppShellRegistry::new(),
    };
    for (index, plugin) in spec.plugins.iter().enumerate() {
        let capabilities = AdapterCapabilities::of(plugin.as_ref());
        debug!(plugin = plugin.name(), index, ?capabilities, "applying plugin");
        plugin
            .apply(&context)
            .await
            .map_err(|source| ServerError::PluginApply {
                index,
                name: plugin.name().to_string(),
                source,
            })?;
    }
    info!(
        cave = %context.cave.name(),
        plugins = spec.plugins.len(),
        "cave server ready"
    );
    Ok(context)
}
