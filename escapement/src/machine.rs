//! The machine contract: definitions, snapshots, subscriptions, hooks.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declarative transition table.
///
/// `states` maps a state name to its outgoing edges; each edge maps an
/// event name to a target state. Everything a machine does beyond moving
/// along these edges (entry hooks, context) is attached at runtime and
/// never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineDef {
    pub id: String,
    pub initial: String,
    #[serde(default)]
    pub states: BTreeMap<String, StateNode>,
}

/// Outgoing edges of a single state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateNode {
    #[serde(default)]
    pub on: BTreeMap<String, String>,
}

impl MachineDef {
    /// Checks the table is internally consistent: the initial state exists
    /// and every edge points at a declared state.
    pub fn validate(&self) -> Result<(), MachineError> {
        if !self.states.contains_key(&self.initial) {
            return Err(MachineError::UnknownState {
                machine: self.id.clone(),
                state: self.initial.clone(),
            });
        }
        for node in self.states.values() {
            for target in node.on.values() {
                if !self.states.contains_key(target) {
                    return Err(MachineError::UnknownState {
                        machine: self.id.clone(),
                        state: target.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Immutable view of a machine after a transition commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub state: String,
    pub context: Value,
}

/// Engine errors. Resolution-style questions ("what state are you in?")
/// answer with `Option`; these are the dispatch failures.
#[derive(Debug, thiserror::Error)]
pub enum MachineError {
    #[error("machine `{machine}` was never started")]
    NotStarted { machine: String },

    #[error("machine `{machine}` references unknown state `{state}`")]
    UnknownState { machine: String, state: String },
}

/// Callback invoked synchronously when a transition commits.
pub type SnapshotCallback = Box<dyn Fn(&MachineSnapshot) + Send + Sync>;

/// Async side effect run when a state is entered.
///
/// Hooks receive the committed snapshot by value; anything they need
/// beyond that (a router, a store handle) is captured in the closure.
pub type StateHook = Arc<dyn Fn(MachineSnapshot) -> BoxFuture<'static, ()> + Send + Sync>;

/// Per-state entry hooks, attached to a machine at construction.
#[derive(Default, Clone)]
pub struct StateHooks {
    hooks: BTreeMap<String, StateHook>,
}

impl StateHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook` to run each time `state` is entered.
    pub fn on_enter(
        mut self,
        state: impl Into<String>,
        hook: impl Fn(MachineSnapshot) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.insert(state.into(), Arc::new(hook));
        self
    }

    pub fn get(&self, state: &str) -> Option<StateHook> {
        self.hooks.get(state).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for StateHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateHooks")
            .field("states", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Removes one subscription when invoked. Dropping the guard without
/// calling it leaves the subscription in place.
pub struct Unsubscribe(Box<dyn FnOnce() + Send>);

impl Unsubscribe {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn call(self) {
        (self.0)()
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Unsubscribe")
    }
}

/// The seam between cavekit and whatever executes machines.
///
/// Queries (`snapshot`) answer `None` for a machine that never started;
/// sends to such a machine are rejected with [`MachineError::NotStarted`].
#[async_trait]
pub trait Machine: Send + Sync {
    fn id(&self) -> &str;

    /// Enters the initial state on first call; later calls resume a
    /// stopped machine in whatever state it held.
    async fn start(&self) -> Result<(), MachineError>;

    /// Stops accepting events. State and context stay queryable.
    async fn stop(&self);

    /// Forwards one event and returns the resulting snapshot. Events with
    /// no edge out of the current state are ignored: the machine stays
    /// put and the current snapshot is returned.
    async fn send(&self, event: &str, data: Option<Value>) -> Result<MachineSnapshot, MachineError>;

    /// Last committed snapshot, `None` before the first start.
    fn snapshot(&self) -> Option<MachineSnapshot>;

    /// Registers a callback for future committed transitions. The current
    /// snapshot is not replayed.
    fn subscribe(&self, cb: SnapshotCallback) -> Unsubscribe;

    /// Shallow-merges `patch` into the machine's context object.
    fn update_context(&self, patch: serde_json::Map<String, Value>);
}
