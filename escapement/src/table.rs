//! The bundled reference engine: a machine that walks a [`MachineDef`]
//! table and nothing more.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::machine::{
    Machine, MachineDef, MachineError, MachineSnapshot, SnapshotCallback, StateHooks, Unsubscribe,
};

type SharedCallback = Arc<dyn Fn(&MachineSnapshot) + Send + Sync>;

struct Inner {
    running: bool,
    /// `None` until the first start commits the initial state.
    state: Option<String>,
    context: Value,
}

/// Table interpreter over [`MachineDef`].
///
/// Transitions commit under a short lock; subscribers are then notified
/// synchronously, and the entered state's hook (if any) runs after the
/// notification, outside the lock, so hooks may send events to this or
/// any other machine.
pub struct TableMachine {
    def: MachineDef,
    hooks: StateHooks,
    inner: Mutex<Inner>,
    subscribers: Arc<Mutex<BTreeMap<u64, SharedCallback>>>,
    next_subscriber: AtomicU64,
}

impl std::fmt::Debug for TableMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableMachine")
            .field("def", &self.def)
            .finish_non_exhaustive()
    }
}

impl TableMachine {
    /// Builds a machine after validating the table.
    pub fn new(def: MachineDef) -> Result<Self, MachineError> {
        def.validate()?;
        Ok(Self {
            def,
            hooks: StateHooks::new(),
            inner: Mutex::new(Inner {
                running: false,
                state: None,
                context: Value::Object(Map::new()),
            }),
            subscribers: Arc::new(Mutex::new(BTreeMap::new())),
            next_subscriber: AtomicU64::new(0),
        })
    }

    /// Seeds the context. Objects are stored verbatim, `null` resets to an
    /// empty object, anything else is wrapped as `{"value": v}`.
    pub fn with_context(self, context: Value) -> Self {
        self.inner.lock().context = normalize_context(context);
        self
    }

    /// Attaches per-state entry hooks.
    pub fn with_hooks(mut self, hooks: StateHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn def(&self) -> &MachineDef {
        &self.def
    }

    fn notify(&self, snapshot: &MachineSnapshot) {
        let callbacks: Vec<SharedCallback> = self.subscribers.lock().values().cloned().collect();
        for cb in callbacks {
            cb(snapshot);
        }
    }
}

fn normalize_context(context: Value) -> Value {
    match context {
        Value::Object(_) => context,
        Value::Null => Value::Object(Map::new()),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Value::Object(map)
        }
    }
}

fn merge_into(context: &mut Value, data: Value) {
    if !context.is_object() {
        *context = Value::Object(Map::new());
    }
    if let Value::Object(target) = context {
        match data {
            Value::Null => {}
            Value::Object(map) => {
                for (k, v) in map {
                    target.insert(k, v);
                }
            }
            other => {
                target.insert("value".to_string(), other);
            }
        }
    }
}

#[async_trait]
impl Machine for TableMachine {
    fn id(&self) -> &str {
        &self.def.id
    }

    async fn start(&self) -> Result<(), MachineError> {
        let entered = {
            let mut inner = self.inner.lock();
            if inner.running {
                return Ok(());
            }
            inner.running = true;
            if inner.state.is_some() {
                // Restart resumes the held state without re-entering it.
                None
            } else {
                inner.state = Some(self.def.initial.clone());
                Some(MachineSnapshot {
                    state: self.def.initial.clone(),
                    context: inner.context.clone(),
                })
            }
        };
        if let Some(snapshot) = entered {
            debug!(machine = %self.def.id, state = %snapshot.state, "machine started");
            self.notify(&snapshot);
            if let Some(hook) = self.hooks.get(&snapshot.state) {
                hook(snapshot).await;
            }
        }
        Ok(())
    }

    async fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.running = false;
    }

    async fn send(&self, event: &str, data: Option<Value>) -> Result<MachineSnapshot, MachineError> {
        let (snapshot, entered) = {
            let mut inner = self.inner.lock();
            if !inner.running {
                return Err(MachineError::NotStarted {
                    machine: self.def.id.clone(),
                });
            }
            let current = inner
                .state
                .clone()
                .unwrap_or_else(|| self.def.initial.clone());
            let target = self
                .def
                .states
                .get(&current)
                .and_then(|node| node.on.get(event))
                .cloned();
            match target {
                None => {
                    // No edge for this event: stay put, report where we are.
                    let snapshot = MachineSnapshot {
                        state: current,
                        context: inner.context.clone(),
                    };
                    return Ok(snapshot);
                }
                Some(next) => {
                    if let Some(data) = data {
                        merge_into(&mut inner.context, data);
                    }
                    debug!(
                        machine = %self.def.id,
                        from = %current,
                        to = %next,
                        event,
                        "transition"
                    );
                    inner.state = Some(next.clone());
                    let snapshot = MachineSnapshot {
                        state: next,
                        context: inner.context.clone(),
                    };
                    (snapshot.clone(), snapshot.state)
                }
            }
        };
        self.notify(&snapshot);
        if let Some(hook) = self.hooks.get(&entered) {
            hook(snapshot.clone()).await;
        }
        Ok(snapshot)
    }

    fn snapshot(&self) -> Option<MachineSnapshot> {
        let inner = self.inner.lock();
        inner.state.as_ref().map(|state| MachineSnapshot {
            state: state.clone(),
            context: inner.context.clone(),
        })
    }

    fn subscribe(&self, cb: SnapshotCallback) -> Unsubscribe {
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().insert(id, Arc::from(cb));
        let subscribers = Arc::clone(&self.subscribers);
        Unsubscribe::new(move || {
            subscribers.lock().remove(&id);
        })
    }

    fn update_context(&self, patch: Map<String, Value>) {
        let mut inner = self.inner.lock();
        merge_into(&mut inner.context, Value::Object(patch));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn toggle_def() -> MachineDef {
        serde_json::from_value(json!({
            "id": "toggle",
            "initial": "off",
            "states": {
                "off": { "on": { "FLIP": "on" } },
                "on": { "on": { "FLIP": "off" } }
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_enters_initial_state() {
        let machine = TableMachine::new(toggle_def()).unwrap();
        assert!(machine.snapshot().is_none());
        machine.start().await.unwrap();
        assert_eq!(machine.snapshot().unwrap().state, "off");
    }

    #[tokio::test]
    async fn test_send_moves_along_edges() {
        let machine = TableMachine::new(toggle_def()).unwrap();
        machine.start().await.unwrap();
        let snap = machine.send("FLIP", None).await.unwrap();
        assert_eq!(snap.state, "on");
        let snap = machine.send("FLIP", None).await.unwrap();
        assert_eq!(snap.state, "off");
    }

    #[tokio::test]
    async fn test_unhandled_event_is_ignored() {
        let machine = TableMachine::new(toggle_def()).unwrap();
        machine.start().await.unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let _guard = machine.subscribe(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        let snap = machine.send("NO_SUCH_EVENT", None).await.unwrap();
        assert_eq!(snap.state, "off");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_before_start_is_rejected() {
        let machine = TableMachine::new(toggle_def()).unwrap();
        let err = machine.send("FLIP", None).await.unwrap_err();
        assert!(matches!(err, MachineError::NotStarted { .. }));
    }

    #[tokio::test]
    async fn test_repeat_entries_notify_each_time() {
        let machine = TableMachine::new(toggle_def()).unwrap();
        machine.start().await.unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let _guard = machine.subscribe(Box::new(move |snap| {
            if snap.state == "on" {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        }));
        machine.send("FLIP", None).await.unwrap();
        machine.send("FLIP", None).await.unwrap();
        machine.send("FLIP", None).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_exactly_one_registration() {
        let machine = TableMachine::new(toggle_def()).unwrap();
        machine.start().await.unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&hits);
        let first = machine.subscribe(Box::new(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        }));
        let b = Arc::clone(&hits);
        let _second = machine.subscribe(Box::new(move |_| {
            b.fetch_add(1, Ordering::SeqCst);
        }));
        first.call();
        machine.send("FLIP", None).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_event_data_merges_into_context() {
        let machine = TableMachine::new(toggle_def())
            .unwrap()
            .with_context(json!({ "count": 0 }));
        machine.start().await.unwrap();
        let snap = machine
            .send("FLIP", Some(json!({ "count": 1, "who": "tester" })))
            .await
            .unwrap();
        assert_eq!(snap.context, json!({ "count": 1, "who": "tester" }));
    }

    #[tokio::test]
    async fn test_scalar_event_data_wraps_under_value() {
        let machine = TableMachine::new(toggle_def()).unwrap();
        machine.start().await.unwrap();
        let snap = machine.send("FLIP", Some(json!(42))).await.unwrap();
        assert_eq!(snap.context, json!({ "value": 42 }));
    }

    #[tokio::test]
    async fn test_update_context_is_a_shallow_merge() {
        let machine = TableMachine::new(toggle_def())
            .unwrap()
            .with_context(json!({ "a": 1, "b": 2 }));
        machine.start().await.unwrap();
        let mut patch = Map::new();
        patch.insert("b".to_string(), json!(3));
        machine.update_context(patch);
        assert_eq!(machine.snapshot().unwrap().context, json!({ "a": 1, "b": 3 }));
    }

    #[tokio::test]
    async fn test_restart_resumes_held_state() {
        let machine = TableMachine::new(toggle_def()).unwrap();
        machine.start().await.unwrap();
        machine.send("FLIP", None).await.unwrap();
        machine.stop().await;
        assert!(machine.send("FLIP", None).await.is_err());
        machine.start().await.unwrap();
        assert_eq!(machine.snapshot().unwrap().state, "on");
    }

    #[tokio::test]
    async fn test_entry_hook_runs_on_each_entry() {
        let entries = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&entries);
        let hooks = StateHooks::new().on_enter("on", move |_snap| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });
        let machine = TableMachine::new(toggle_def()).unwrap().with_hooks(hooks);
        machine.start().await.unwrap();
        machine.send("FLIP", None).await.unwrap();
        machine.send("FLIP", None).await.unwrap();
        machine.send("FLIP", None).await.unwrap();
        assert_eq!(entries.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_validate_rejects_dangling_target() {
        let def: MachineDef = serde_json::from_value(json!({
            "id": "broken",
            "initial": "a",
            "states": { "a": { "on": { "GO": "nowhere" } } }
        }))
        .unwrap();
        let err = TableMachine::new(def).unwrap_err();
        assert!(matches!(err, MachineError::UnknownState { .. }));
    }
}
