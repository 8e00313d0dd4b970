//! Server-layer errors.

use cavekit_core::CoreError;
use cavekit_store::StoreError;

/// What a plugin's `apply` can fail with.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("adapter `{adapter}` failed: {reason}")]
    Failed { adapter: String, reason: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AdapterError {
    pub fn failed(adapter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            adapter: adapter.into(),
            reason: reason.into(),
        }
    }
}

/// Startup failures. A plugin that cannot apply aborts the whole
/// sequence; there is no partial-success continuation.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("plugin `{name}` (position {index}) failed to apply")]
    PluginApply {
        index: usize,
        name: String,
        #[source]
        source: AdapterError,
    },
}
