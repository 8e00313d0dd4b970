//! Evented mod loading: fire mod hooks when watched machines reach
//! configured states.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use cavekit_core::{conventional_address, TomeManager};
use cavekit_types::MachineAddress;
use escapement::Unsubscribe;

use crate::adapter::ServerAdapter;
use crate::context::CaveServerContext;
use crate::error::AdapterError;

/// Hook invoked with the configured mod name, if any.
pub type ModHook = Arc<dyn Fn(Option<&str>) + Send + Sync>;

/// Overrides the default path-to-address convention.
pub type AddressResolver = Arc<dyn Fn(&str) -> Option<MachineAddress> + Send + Sync>;

/// What to watch and what to call.
///
/// `load` and `unload` map machine paths to target states. The same
/// path may appear in both maps; each entry arms its own independent
/// subscription, and nothing deduplicates repeat visits to a target
/// state: every arrival fires.
#[derive(Clone, Default)]
pub struct ModLoaderOptions {
    pub mod_name: Option<String>,
    pub load: BTreeMap<String, String>,
    pub unload: BTreeMap<String, String>,
    pub resolver: Option<AddressResolver>,
    pub on_load: Option<ModHook>,
    pub on_unload: Option<ModHook>,
}

impl ModLoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mod_name(mut self, name: impl Into<String>) -> Self {
        self.mod_name = Some(name.into());
        self
    }

    pub fn watch_load(mut self, path: impl Into<String>, state: impl Into<String>) -> Self {
        self.load.insert(path.into(), state.into());
        self
    }

    pub fn watch_unload(mut self, path: impl Into<String>, state: impl Into<String>) -> Self {
        self.unload.insert(path.into(), state.into());
        self
    }

    pub fn resolver(
        mut self,
        resolver: impl Fn(&str) -> Option<MachineAddress> + Send + Sync + 'static,
    ) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn on_load(mut self, hook: impl Fn(Option<&str>) + Send + Sync + 'static) -> Self {
        self.on_load = Some(Arc::new(hook));
        self
    }

    pub fn on_unload(mut self, hook: impl Fn(Option<&str>) + Send + Sync + 'static) -> Self {
        self.on_unload = Some(Arc::new(hook));
        self
    }
}

enum Trigger {
    Load,
    Unload,
}

/// Consumer-position plugin: reads the tome manager from the context
/// and subscribes to the watched machines.
///
/// If no producer published a manager yet, the loader stays disarmed
/// (zero subscriptions) and `apply` still succeeds; list a host adapter
/// before it. Unsubscribe guards are collected, never invoked
/// automatically; call [`EventedModLoader::unsubscribe_all`] to detach.
pub struct EventedModLoader {
    options: ModLoaderOptions,
    guards: Mutex<Vec<Unsubscribe>>,
    loads: Arc<AtomicU64>,
    unloads: Arc<AtomicU64>,
}

impl EventedModLoader {
    pub fn new(options: ModLoaderOptions) -> Self {
        Self {
            options,
            guards: Mutex::new(Vec::new()),
            loads: Arc::new(AtomicU64::new(0)),
            unloads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// How many machine subscriptions are currently armed.
    pub fn subscription_count(&self) -> usize {
        self.guards.lock().len()
    }

    /// Times the load trigger fired (including tenant cycles).
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> u64 {
        self.unloads.load(Ordering::SeqCst)
    }

    /// Detaches every armed subscription.
    pub fn unsubscribe_all(&self) {
        for guard in self.guards.lock().drain(..) {
            guard.call();
        }
    }

    /// A handler for tenant switches: fires unload then load hooks
    /// unconditionally, regardless of any machine state.
    pub fn tenant_change_handler(&self) -> Arc<dyn Fn(Option<&str>) + Send + Sync> {
        let on_load = self.options.on_load.clone();
        let on_unload = self.options.on_unload.clone();
        let mod_name = self.options.mod_name.clone();
        let loads = Arc::clone(&self.loads);
        let unloads = Arc::clone(&self.unloads);
        Arc::new(move |tenant| {
            debug!(tenant = ?tenant, "tenant changed, cycling mods");
            unloads.fetch_add(1, Ordering::SeqCst);
            if let Some(hook) = &on_unload {
                hook(mod_name.as_deref());
            }
            loads.fetch_add(1, Ordering::SeqCst);
            if let Some(hook) = &on_load {
                hook(mod_name.as_deref());
            }
        })
    }

    fn resolve(&self, path: &str) -> Option<MachineAddress> {
        match &self.options.resolver {
            Some(resolver) => resolver(path),
            None => conventional_address(path),
        }
    }

    fn arm(
        &self,
        manager: &TomeManager,
        path: &str,
        target: &str,
        trigger: Trigger,
    ) -> Option<Unsubscribe> {
        let Some(address) = self.resolve(path) else {
            warn!(path, "mod path does not resolve to a machine address");
            return None;
        };
        let Some(instance) = manager.tome(&address.tome_id) else {
            warn!(path, tome = %address.tome_id, "mod path names an unknown tome");
            return None;
        };
        let Some(machine) = instance.machine(&address.machine_id) else {
            warn!(
                path,
                tome = %address.tome_id,
                machine = %address.machine_id,
                "mod path names an unknown machine"
            );
            return None;
        };
        let target = target.to_string();
        let (hook, counter) = match trigger {
            Trigger::Load => (self.options.on_load.clone(), Arc::clone(&self.loads)),
            Trigger::Unload => (self.options.on_unload.clone(), Arc::clone(&self.unloads)),
        };
        let mod_name = self.options.mod_name.clone();
        Some(machine.subscribe(Box::new(move |snapshot| {
            if snapshot.state == target {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(hook) = &hook {
                    hook(mod_name.as_deref());
                }
            }
        })))
    }
}

#[async_trait]
impl ServerAdapter for EventedModLoader {
    fn name(&self) -> &str {
        "evented-mod-loader"
    }

    async fn apply(&self, context: &CaveServerContext) -> Result<(), AdapterError> {
        let Some(manager) = context.tome_manager.get() else {
            warn!("no tome manager in context yet; mod loader stays disarmed");
            return Ok(());
        };
        let mut guards = Vec::new();
        for (path, target) in &self.options.load {
            if let Some(guard) = self.arm(&manager, path, target, Trigger::Load) {
                guards.push(guard);
            }
        }
        for (path, target) in &self.options.unload {
            if let Some(guard) = self.arm(&manager, path, target, Trigger::Unload) {
                guards.push(guard);
            }
        }
        debug!(subscriptions = guards.len(), "mod loader armed");
        self.guards.lock().extend(guards);
        Ok(())
    }
}
