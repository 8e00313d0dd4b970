//! Shared types for cavekit
//!
//! This crate provides the configuration and data model used across the
//! cavekit ecosystem: the spelunk navigation tree, tome definitions with
//! their machine tables and routing, persistence policies, and users.
//! Everything here is plain serde data; runtime behavior lives in
//! `cavekit-core` and above.

use std::collections::BTreeMap;

use escapement::MachineDef;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One node of the navigation tree.
///
/// Keys of `child_caves` are path segments; a spelunk is a tree by
/// construction (children are owned) and is never mutated after it is
/// built. Fields that are `None` stay `None` in derived projections.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Spelunk {
    #[serde(default)]
    pub child_caves: BTreeMap<String, Spelunk>,
    #[serde(default)]
    pub tomes: Vec<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub render_key: Option<String>,
    #[serde(default)]
    pub tome_id: Option<String>,
    #[serde(default)]
    pub is_modable_cave: bool,
    /// Permission expression gating this location, e.g. `">anonymous"`.
    #[serde(default)]
    pub permission: Option<String>,
}

/// Registry metadata a cave may advertise about itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryMeta {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<String>,
}

/// Root configuration of a cave: a name, its spelunk tree, and optional
/// registry metadata. Owned by exactly one cave instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaveConfig {
    pub name: String,
    #[serde(default)]
    pub spelunk: Spelunk,
    #[serde(default)]
    pub registry: Option<RegistryMeta>,
}

impl CaveConfig {
    pub fn new(name: impl Into<String>, spelunk: Spelunk) -> Self {
        Self {
            name: name.into(),
            spelunk,
            registry: None,
        }
    }
}

/// Read-only projection of a resolved location: what to mount, where,
/// with which tomes. Unresolved fields stay `None`, never inferred.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderTarget {
    pub route: Option<String>,
    pub container: Option<String>,
    #[serde(default)]
    pub tomes: Vec<String>,
    pub tome_id: Option<String>,
}

/// HTTP method of a route binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteMethod {
    Get,
    #[default]
    Post,
    Put,
    Delete,
    Patch,
}

impl RouteMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteMethod::Get => "GET",
            RouteMethod::Post => "POST",
            RouteMethod::Put => "PUT",
            RouteMethod::Delete => "DELETE",
            RouteMethod::Patch => "PATCH",
        }
    }
}

/// A single named route exposed by a tome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteBinding {
    pub path: String,
    #[serde(default)]
    pub method: RouteMethod,
}

/// Where a tome's routes hang and what they are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    pub base_path: String,
    #[serde(default)]
    pub routes: BTreeMap<String, RouteBinding>,
}

/// How (and whether) a tome's documents are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistencePolicy {
    #[serde(default)]
    pub enabled: bool,
    /// Backend name resolved against the persistence registry.
    #[serde(default)]
    pub adapter: Option<String>,
    /// Backend-specific settings, passed through opaquely.
    #[serde(default)]
    pub config: Value,
}

/// Authorship metadata carried by mod-delivered tomes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModMetadata {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One machine inside a tome: the transition table plus optional
/// descriptive fields and a seed context. Side-effect hooks are attached
/// programmatically at registration and never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub machine: MachineDef,
    #[serde(default)]
    pub context: Option<Value>,
}

/// A bundle of machines with routing and a persistence policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomeConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub machines: BTreeMap<String, MachineSpec>,
    #[serde(default)]
    pub routing: Option<RoutingTable>,
    #[serde(default)]
    pub persistence: Option<PersistencePolicy>,
    #[serde(default)]
    pub mod_metadata: Option<ModMetadata>,
}

/// Fully resolved machine address: which tome, which machine inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineAddress {
    pub tome_id: String,
    pub machine_id: String,
}

impl MachineAddress {
    pub fn new(tome_id: impl Into<String>, machine_id: impl Into<String>) -> Self {
        Self {
            tome_id: tome_id.into(),
            machine_id: machine_id.into(),
        }
    }
}

impl std::fmt::Display for MachineAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tome_id, self.machine_id)
    }
}

/// An authenticated (or anonymous) user as permission evaluation sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaveUser {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub permission_level: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl CaveUser {
    pub fn new(id: impl Into<String>, permission_level: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: None,
            email: None,
            permission_level: permission_level.into(),
            tenant_id: None,
        }
    }

    /// The user every unauthenticated request acts as.
    pub fn anonymous() -> Self {
        Self::new("anonymous", "anonymous")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spelunk_defaults_from_sparse_yaml() {
        let spelunk: Spelunk = serde_yaml::from_str(
            r#"
            route: /home
            child_caves:
              editor:
                container: editor-panel
                tome_id: editor-tome
            "#,
        )
        .unwrap();
        assert_eq!(spelunk.route.as_deref(), Some("/home"));
        assert!(!spelunk.is_modable_cave);
        let child = &spelunk.child_caves["editor"];
        assert_eq!(child.tome_id.as_deref(), Some("editor-tome"));
        assert!(child.tomes.is_empty());
    }

    #[test]
    fn test_route_method_defaults_to_post() {
        let binding: RouteBinding = serde_yaml::from_str("path: /orders").unwrap();
        assert_eq!(binding.method, RouteMethod::Post);
        let binding: RouteBinding =
            serde_yaml::from_str("path: /orders\nmethod: GET").unwrap();
        assert_eq!(binding.method, RouteMethod::Get);
    }

    #[test]
    fn test_machine_spec_flattens_the_table() {
        let spec: MachineSpec = serde_yaml::from_str(
            r#"
            id: editor
            initial: idle
            states:
              idle:
                on:
                  EDIT: editing
              editing:
                on:
                  SAVE: idle
            context:
              content: ""
            "#,
        )
        .unwrap();
        assert_eq!(spec.machine.id, "editor");
        assert_eq!(spec.machine.initial, "idle");
        assert_eq!(spec.machine.states.len(), 2);
        assert!(spec.context.is_some());
    }
}
