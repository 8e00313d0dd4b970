//! Per-tome document storage for cavekit.
//!
//! Every tome that persists anything talks to a [`CaveDb`]: a small
//! key-to-document contract (`put`/`get`/`find`/`find_one`/`close`) bound
//! to exactly one tome id. Backends are interchangeable; the same
//! contract tests run against all of them:
//!
//! - [`MemoryCaveDb`]: the reference backend, a map behind a lock.
//! - [`FileCaveDb`]: one JSON file per tome under a data directory.
//! - [`KvCaveDb`]: any get/set cache via [`KvClient`], with the key
//!   side-index that makes `find` possible on backends that cannot scan.
//!
//! [`PersistenceRegistry`] wires tome configs to backends and falls back
//! to memory, observably, when a configured backend cannot be built.

pub mod adapter;
pub mod error;
pub mod file;
pub mod kv;
pub mod memory;
pub mod registry;

pub use adapter::{matches_selector, stamp, CaveDb, Document, Selector};
pub use error::{StoreError, StoreResult};
pub use file::FileCaveDb;
pub use kv::{InProcessKv, KvCaveDb, KvClient};
pub use memory::MemoryCaveDb;
pub use registry::{AdapterFactories, FactoryContext, FallbackEvent, PersistenceRegistry};
