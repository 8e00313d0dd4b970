//! # cavekit-server
//!
//! The host-agnostic server layer: the [`ServerAdapter`] plugin contract
//! with its optional capabilities, the [`CaveServerContext`] plugins
//! share, the [`create_cave_server`] startup sequence, section-filtered
//! adapter layering, the evented mod loader, and the app-shell registry.
//!
//! Concrete hosts (see `cavekit-axum`) translate their native requests
//! into the normalized shapes defined here; nothing in this crate knows
//! which HTTP framework, if any, sits on top.

pub mod adapter;
pub mod context;
pub mod error;
pub mod layered;
pub mod modload;
pub mod monitor;
pub mod server;
pub mod shell;

pub use adapter::{
    AdapterCapabilities, CircuitBreakerConfig, HealthCheck, Middleware, MiddlewareHost,
    MiddlewareOutcome, NormalizedRequest, NormalizedResponse, RetryPolicy, RouteDef, RouteHandler,
    RouteMounter, RouteRegistrar, ServerAdapter,
};
pub use context::{CaveServerContext, Sections, SlotCell};
pub use error::{AdapterError, ServerError};
pub use layered::SectionFiltered;
pub use modload::{EventedModLoader, ModHook, ModLoaderOptions};
pub use monitor::{InMemoryResourceMonitor, RequestStats, ResourceMonitor};
pub use server::{create_cave_server, CaveServerSpec};
pub use shell::{AppShellDescriptor, AppShellRegistry};
