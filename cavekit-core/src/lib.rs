//! # cavekit-core
//!
//! Core library for cavekit: hierarchical path resolution over spelunk
//! trees, tome registration and lifecycle, address-based machine routing,
//! and rank-based permission evaluation.

pub mod cave;
pub mod error;
pub mod permission;
pub mod router;
pub mod tome;

pub use cave::{Cave, RoutedConfig, ViewKeyCallback};
pub use error::CoreError;
pub use permission::{evaluate_permission, DEFAULT_LEVEL_ORDER};
pub use router::{conventional_address, MachineRouter};
pub use tome::{TomeInstance, TomeManager, TomeStatus};
