//! App shells: external programs a deployment can name and launch.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A named external command: interpreter/binary, optional entry script,
/// arguments, working directory and environment. Pure data; hosts decide
/// when and whether to spawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppShellDescriptor {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl AppShellDescriptor {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            script: None,
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// Full argv after the program: the entry script (if any) followed
    /// by the configured arguments.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::new();
        if let Some(script) = &self.script {
            argv.push(script.clone());
        }
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// Shared registry of app shells, exposed through the server context so
/// a producer plugin can publish shells for later plugins (and the host)
/// to launch.
#[derive(Default)]
pub struct AppShellRegistry {
    shells: RwLock<HashMap<String, AppShellDescriptor>>,
}

impl AppShellRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a shell under its name.
    pub fn register(&self, descriptor: AppShellDescriptor) {
        self.shells
            .write()
            .insert(descriptor.name.clone(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<AppShellDescriptor> {
        self.shells.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shells.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.shells.read().is_empty()
    }
}
