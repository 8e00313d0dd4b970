//! # cavekit-axum
//!
//! Axum host adapter for cavekit.
//!
//! [`AxumCaveAdapter`] implements [`cavekit_server::ServerAdapter`] and all of
//! the optional capability traits. During `apply` it builds the tome manager,
//! starts every configured tome, and publishes the manager into the shared
//! context; afterwards [`AxumCaveAdapter::into_router`] assembles an
//! [`axum::Router`] exposing the dispatch, store, registry, status, and health
//! routes plus anything other plugins contributed through the capabilities.

pub mod adapter;
pub mod routes;
pub mod translate;

pub use adapter::{AxumAdapterOptions, AxumCaveAdapter, PermissionPolicy};
