//! Address-based machine routing.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use cavekit_types::MachineAddress;
use escapement::{Machine, MachineSnapshot};

use crate::error::CoreError;

/// Routes string addresses to machines.
///
/// Resolution checks the explicit mapping table first, then applies the
/// default convention: first path segment is the tome id, second is the
/// machine id, and a single segment stands for both. Senders never hold
/// machine references; the router looks one up per dispatch, so a
/// machine rebound under the same address is picked up by the next send.
#[derive(Default)]
pub struct MachineRouter {
    machines: RwLock<HashMap<String, Arc<dyn Machine>>>,
    mapping: RwLock<HashMap<String, MachineAddress>>,
}

impl MachineRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(address: &MachineAddress) -> String {
        format!("{}/{}", address.tome_id, address.machine_id)
    }

    /// Binds `machine` under `address`, replacing any prior binding.
    pub fn bind(&self, address: &MachineAddress, machine: Arc<dyn Machine>) {
        self.machines.write().insert(Self::slot(address), machine);
    }

    pub fn unbind(&self, address: &MachineAddress) {
        self.machines.write().remove(&Self::slot(address));
    }

    /// Drops every binding belonging to `tome_id`.
    pub fn unbind_tome(&self, tome_id: &str) {
        let prefix = format!("{tome_id}/");
        self.machines
            .write()
            .retain(|slot, _| !slot.starts_with(&prefix));
    }

    /// Adds an explicit alias consulted before the default convention.
    pub fn map_address(&self, alias: impl Into<String>, address: MachineAddress) {
        self.mapping.write().insert(alias.into(), address);
    }

    /// Turns a path into a machine address, or `None` for the empty
    /// path. Explicit aliases win; otherwise the default convention
    /// applies.
    pub fn resolve(&self, path: &str) -> Option<MachineAddress> {
        if let Some(address) = self.mapping.read().get(path) {
            return Some(address.clone());
        }
        conventional_address(path)
    }

    /// The machine bound under `address`, if any.
    pub fn machine(&self, address: &MachineAddress) -> Option<Arc<dyn Machine>> {
        self.machines.read().get(&Self::slot(address)).cloned()
    }

    /// Resolves `path` and forwards one event to the bound machine.
    pub async fn send(
        &self,
        path: &str,
        event: &str,
        data: Option<Value>,
    ) -> Result<MachineSnapshot, CoreError> {
        let address = self
            .resolve(path)
            .ok_or_else(|| CoreError::Unresolvable(path.to_string()))?;
        let machine = self.machine(&address).ok_or_else(|| CoreError::UnknownMachine {
            tome: address.tome_id.clone(),
            machine: address.machine_id.clone(),
        })?;
        Ok(machine.send(event, data).await?)
    }
}

/// The default addressing convention: first segment names the tome,
/// second names the machine, a single segment stands for both, and
/// segments beyond the second are ignored.
pub fn conventional_address(path: &str) -> Option<MachineAddress> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [] => None,
        [only] => Some(MachineAddress::new(*only, *only)),
        [tome, machine, ..] => Some(MachineAddress::new(*tome, *machine)),
    }
}
