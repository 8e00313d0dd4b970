//! Binds tome configs to storage backends.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use cavekit_types::TomeConfig;

use crate::adapter::CaveDb;
use crate::error::StoreResult;
use crate::file::FileCaveDb;
use crate::kv::{KvCaveDb, KvClient};
use crate::memory::MemoryCaveDb;

/// What a factory gets to work with: the tome and the policy's opaque
/// `config` value.
#[derive(Debug, Clone)]
pub struct FactoryContext {
    pub tome_id: String,
    pub config: Value,
}

/// Builds one adapter instance for one tome.
pub type AdapterFactory =
    Arc<dyn Fn(FactoryContext) -> BoxFuture<'static, StoreResult<Arc<dyn CaveDb>>> + Send + Sync>;

/// Named adapter factories available to [`PersistenceRegistry::build`].
#[derive(Clone, Default)]
pub struct AdapterFactories {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterFactories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `memory` plus, when a data dir is known, `file`.
    pub fn with_defaults(data_dir: Option<PathBuf>) -> Self {
        let mut factories = Self::new().register("memory", memory_factory());
        if let Some(dir) = data_dir {
            factories = factories.register("file", file_factory(dir));
        }
        factories
    }

    pub fn register(mut self, name: impl Into<String>, factory: AdapterFactory) -> Self {
        self.factories.insert(name.into(), factory);
        self
    }

    fn get(&self, name: &str) -> Option<&AdapterFactory> {
        self.factories.get(name)
    }
}

pub fn memory_factory() -> AdapterFactory {
    Arc::new(|ctx: FactoryContext| {
        Box::pin(async move { Ok(Arc::new(MemoryCaveDb::new(ctx.tome_id)) as Arc<dyn CaveDb>) })
    })
}

pub fn file_factory(data_dir: PathBuf) -> AdapterFactory {
    Arc::new(move |ctx: FactoryContext| {
        let dir = data_dir.clone();
        Box::pin(async move {
            let db = FileCaveDb::open(dir, ctx.tome_id).await?;
            Ok(Arc::new(db) as Arc<dyn CaveDb>)
        })
    })
}

/// Factory over a shared cache client; every tome gets its own
/// namespaced view of the same client.
pub fn kv_factory(client: Arc<dyn KvClient>) -> AdapterFactory {
    Arc::new(move |ctx: FactoryContext| {
        let client = Arc::clone(&client);
        Box::pin(async move {
            Ok(Arc::new(KvCaveDb::new(ctx.tome_id, client)) as Arc<dyn CaveDb>)
        })
    })
}

/// Recorded whenever a configured backend could not be built and the
/// tome fell back to memory.
#[derive(Debug, Clone, Serialize)]
pub struct FallbackEvent {
    pub tome_id: String,
    pub requested: String,
    pub fallen_back_to: String,
}

/// Per-tome adapter bindings for a whole deployment.
///
/// Built once from the tome configs; a tome whose policy names a backend
/// that is missing or fails to construct is bound to [`MemoryCaveDb`]
/// instead, and the switch is recorded so operators can see it: degraded,
/// never dead. Tomes without persistence get a lazy memory binding on
/// first touch; that is not recorded as a fallback.
pub struct PersistenceRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn CaveDb>>>,
    fallbacks: RwLock<Vec<FallbackEvent>>,
}

impl PersistenceRegistry {
    pub fn empty() -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
            fallbacks: RwLock::new(Vec::new()),
        }
    }

    pub async fn build(tome_configs: &[TomeConfig], factories: &AdapterFactories) -> Self {
        let registry = Self::empty();
        for config in tome_configs {
            let Some(policy) = config.persistence.as_ref() else {
                continue;
            };
            if !policy.enabled {
                continue;
            }
            let requested = policy.adapter.clone().unwrap_or_else(|| "memory".to_string());
            let ctx = FactoryContext {
                tome_id: config.id.clone(),
                config: policy.config.clone(),
            };
            let adapter = match factories.get(&requested) {
                Some(factory) => match factory(ctx).await {
                    Ok(adapter) => adapter,
                    Err(err) => {
                        warn!(
                            tome = %config.id,
                            adapter = %requested,
                            error = %err,
                            "persistence backend failed to build, falling back to memory"
                        );
                        registry.record_fallback(&config.id, &requested);
                        Arc::new(MemoryCaveDb::new(config.id.clone()))
                    }
                },
                None => {
                    warn!(
                        tome = %config.id,
                        adapter = %requested,
                        "unknown persistence backend, falling back to memory"
                    );
                    registry.record_fallback(&config.id, &requested);
                    Arc::new(MemoryCaveDb::new(config.id.clone()))
                }
            };
            registry
                .adapters
                .write()
                .insert(config.id.clone(), adapter);
        }
        registry
    }

    fn record_fallback(&self, tome_id: &str, requested: &str) {
        self.fallbacks.write().push(FallbackEvent {
            tome_id: tome_id.to_string(),
            requested: requested.to_string(),
            fallen_back_to: "memory".to_string(),
        });
    }

    /// The adapter bound to `tome_id`, creating a memory binding on
    /// first touch for tomes the build never saw.
    pub fn adapter_for(&self, tome_id: &str) -> Arc<dyn CaveDb> {
        if let Some(adapter) = self.adapters.read().get(tome_id) {
            return Arc::clone(adapter);
        }
        let mut adapters = self.adapters.write();
        Arc::clone(adapters.entry(tome_id.to_string()).or_insert_with(|| {
            debug!(tome = %tome_id, "binding unconfigured tome to memory store");
            Arc::new(MemoryCaveDb::new(tome_id))
        }))
    }

    pub fn tome_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Every backend switch recorded during build.
    pub fn fallback_events(&self) -> Vec<FallbackEvent> {
        self.fallbacks.read().clone()
    }

    pub async fn close_all(&self) -> StoreResult<()> {
        let adapters: Vec<Arc<dyn CaveDb>> = self.adapters.read().values().cloned().collect();
        for adapter in adapters {
            adapter.close().await?;
        }
        Ok(())
    }
}
