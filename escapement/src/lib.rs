//! Minimal table-driven state machine engine.
//!
//! An escapement advances a mechanism one step per tick; this crate advances
//! a machine one state per event. Machines are described by a declarative
//! [`MachineDef`] transition table, executed by [`TableMachine`], and
//! consumed through the [`Machine`] trait so hosts can swap in a richer
//! engine without touching anything that sends events.
//!
//! The engine is intentionally small: flat states, event -> target edges,
//! a JSON context object, snapshot subscriptions, and optional per-state
//! entry hooks. No guards, no hierarchy, no timers.

pub mod machine;
pub mod table;

pub use machine::{
    Machine, MachineDef, MachineError, MachineSnapshot, SnapshotCallback, StateHook, StateHooks,
    StateNode, Unsubscribe,
};
pub use table::TableMachine;
