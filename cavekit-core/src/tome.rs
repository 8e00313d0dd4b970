//! Tome registration and lifecycle.
//!
//! A tome bundles the machines declared by a [`TomeConfig`] behind one
//! id. The manager owns the instances and a shared [`MachineRouter`];
//! registering a tome binds each machine under `<tome_id>/<machine_key>`
//! so anything holding the router (including other machines' hooks) can
//! reach it by address alone.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use cavekit_types::{MachineAddress, TomeConfig};
use escapement::{Machine, MachineSnapshot, StateHooks, TableMachine};

use crate::error::CoreError;
use crate::router::MachineRouter;

/// One registered tome: its config and its live machines.
pub struct TomeInstance {
    config: TomeConfig,
    machines: BTreeMap<String, Arc<dyn Machine>>,
}

impl std::fmt::Debug for TomeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TomeInstance")
            .field("config", &self.config)
            .field("machines", &self.machine_keys())
            .finish()
    }
}

impl TomeInstance {
    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &TomeConfig {
        &self.config
    }

    pub fn machine(&self, key: &str) -> Option<Arc<dyn Machine>> {
        self.machines.get(key).cloned()
    }

    pub fn machine_keys(&self) -> Vec<String> {
        self.machines.keys().cloned().collect()
    }

    /// Starts every machine in the tome.
    pub async fn start(&self) -> Result<(), CoreError> {
        for machine in self.machines.values() {
            machine.start().await?;
        }
        Ok(())
    }

    pub async fn stop(&self) {
        for machine in self.machines.values() {
            machine.stop().await;
        }
    }

    /// Forwards one event to the named machine.
    pub async fn send_message(
        &self,
        machine: &str,
        event: &str,
        data: Option<Value>,
    ) -> Result<MachineSnapshot, CoreError> {
        let target = self
            .machines
            .get(machine)
            .ok_or_else(|| CoreError::UnknownMachine {
                tome: self.config.id.clone(),
                machine: machine.to_string(),
            })?;
        Ok(target.send(event, data).await?)
    }

    /// Current state of the named machine; `None` for unknown machines
    /// or machines that never started.
    pub fn state_of(&self, machine: &str) -> Option<String> {
        self.machines
            .get(machine)
            .and_then(|m| m.snapshot())
            .map(|snap| snap.state)
    }

    pub fn context_of(&self, machine: &str) -> Option<Value> {
        self.machines
            .get(machine)
            .and_then(|m| m.snapshot())
            .map(|snap| snap.context)
    }

    /// Merges `patch` into the named machine's context. Returns whether
    /// the machine exists.
    pub fn update_context(&self, machine: &str, patch: Map<String, Value>) -> bool {
        match self.machines.get(machine) {
            Some(m) => {
                m.update_context(patch);
                true
            }
            None => false,
        }
    }
}

/// Status surface for one tome, as reported by listing routes.
#[derive(Debug, Clone, Serialize)]
pub struct TomeStatus {
    pub id: String,
    pub name: String,
    /// Machine key to current state; `None` before the first start.
    pub machines: BTreeMap<String, Option<String>>,
}

/// Owns every registered tome and the router their machines live in.
#[derive(Default)]
pub struct TomeManager {
    tomes: RwLock<BTreeMap<String, Arc<TomeInstance>>>,
    router: Arc<MachineRouter>,
}

impl TomeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn router(&self) -> Arc<MachineRouter> {
        Arc::clone(&self.router)
    }

    /// Registers a tome, building one machine per spec and binding each
    /// into the router. Nothing is started yet.
    pub fn register_tome(&self, config: TomeConfig) -> Result<Arc<TomeInstance>, CoreError> {
        self.register_tome_with_hooks(config, BTreeMap::new())
    }

    /// Like [`TomeManager::register_tome`], with per-machine entry hooks
    /// (keyed by the machine key in the config). Hooks are runtime-only;
    /// they never appear in serialized configs.
    pub fn register_tome_with_hooks(
        &self,
        config: TomeConfig,
        mut hooks: BTreeMap<String, StateHooks>,
    ) -> Result<Arc<TomeInstance>, CoreError> {
        if self.tomes.read().contains_key(&config.id) {
            return Err(CoreError::DuplicateTome(config.id.clone()));
        }
        let mut machines: BTreeMap<String, Arc<dyn Machine>> = BTreeMap::new();
        for (key, spec) in &config.machines {
            let mut machine = TableMachine::new(spec.machine.clone())?;
            if let Some(context) = &spec.context {
                machine = machine.with_context(context.clone());
            }
            if let Some(state_hooks) = hooks.remove(key) {
                machine = machine.with_hooks(state_hooks);
            }
            machines.insert(key.clone(), Arc::new(machine));
        }
        for (key, machine) in &machines {
            self.router
                .bind(&MachineAddress::new(&config.id, key.as_str()), Arc::clone(machine));
        }
        let instance = Arc::new(TomeInstance {
            config,
            machines,
        });
        info!(tome = %instance.id(), machines = instance.machines.len(), "registered tome");
        self.tomes
            .write()
            .insert(instance.id().to_string(), Arc::clone(&instance));
        Ok(instance)
    }

    /// Stops the tome's machines, unbinds them, and forgets the tome.
    pub async fn unregister_tome(&self, id: &str) -> Result<(), CoreError> {
        let instance = self
            .tomes
            .write()
            .remove(id)
            .ok_or_else(|| CoreError::UnknownTome(id.to_string()))?;
        instance.stop().await;
        self.router.unbind_tome(id);
        info!(tome = %id, "unregistered tome");
        Ok(())
    }

    pub async fn start_tome(&self, id: &str) -> Result<(), CoreError> {
        let instance = self
            .tome(id)
            .ok_or_else(|| CoreError::UnknownTome(id.to_string()))?;
        instance.start().await
    }

    pub async fn stop_tome(&self, id: &str) -> Result<(), CoreError> {
        let instance = self
            .tome(id)
            .ok_or_else(|| CoreError::UnknownTome(id.to_string()))?;
        instance.stop().await;
        Ok(())
    }

    /// Routed dispatch: `address` goes through the router (explicit
    /// aliases first, then the tome/machine convention).
    pub async fn send_message(
        &self,
        address: &str,
        event: &str,
        data: Option<Value>,
    ) -> Result<MachineSnapshot, CoreError> {
        self.router.send(address, event, data).await
    }

    /// Direct dispatch when both ids are already known.
    pub async fn send_to(
        &self,
        tome: &str,
        machine: &str,
        event: &str,
        data: Option<Value>,
    ) -> Result<MachineSnapshot, CoreError> {
        let instance = self
            .tome(tome)
            .ok_or_else(|| CoreError::UnknownTome(tome.to_string()))?;
        instance.send_message(machine, event, data).await
    }

    pub fn tome(&self, id: &str) -> Option<Arc<TomeInstance>> {
        self.tomes.read().get(id).cloned()
    }

    pub fn list_tomes(&self) -> Vec<String> {
        self.tomes.read().keys().cloned().collect()
    }

    /// `None` for unknown tome or machine, never an error.
    pub fn machine_state(&self, tome: &str, machine: &str) -> Option<String> {
        self.tome(tome).and_then(|t| t.state_of(machine))
    }

    pub fn machine_context(&self, tome: &str, machine: &str) -> Option<Value> {
        self.tome(tome).and_then(|t| t.context_of(machine))
    }

    /// Snapshot of every tome for status surfaces.
    pub fn status(&self) -> Vec<TomeStatus> {
        self.tomes
            .read()
            .values()
            .map(|instance| TomeStatus {
                id: instance.config.id.clone(),
                name: instance.config.name.clone(),
                machines: instance
                    .machines
                    .iter()
                    .map(|(key, m)| (key.clone(), m.snapshot().map(|s| s.state)))
                    .collect(),
            })
            .collect()
    }
}
