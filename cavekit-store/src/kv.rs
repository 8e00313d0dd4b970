//! Cache-style backend over a plain get/set client.
//!
//! Caches cannot enumerate keys, so `find` would silently degrade to
//! nothing while `put`/`get` kept working. The adapter therefore
//! maintains an explicit side-index of known keys per tome and consults
//! it for every scan.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::adapter::{matches_selector, stamp, CaveDb, Document, Selector};
use crate::error::{StoreError, StoreResult};

/// Key holding the JSON list of known document keys for a tome.
const KEY_INDEX: &str = "__keys";

/// Minimal surface a cache must offer: string get/set. No scan, no
/// delete; the contract never needs either.
#[async_trait]
pub trait KvClient: Send + Sync {
    async fn kv_get(&self, key: &str) -> StoreResult<Option<String>>;
    async fn kv_set(&self, key: &str, value: String) -> StoreResult<()>;
}

#[async_trait]
impl<T: KvClient + ?Sized> KvClient for Arc<T> {
    async fn kv_get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).kv_get(key).await
    }

    async fn kv_set(&self, key: &str, value: String) -> StoreResult<()> {
        (**self).kv_set(key, value).await
    }
}

/// [`CaveDb`] over any [`KvClient`]. Documents live under
/// `cave:<tome_id>:<key>`, so tomes sharing one physical cache stay
/// isolated.
pub struct KvCaveDb<C: KvClient> {
    tome_id: String,
    client: C,
}

impl<C: KvClient> KvCaveDb<C> {
    pub fn new(tome_id: impl Into<String>, client: C) -> Self {
        Self {
            tome_id: tome_id.into(),
            client,
        }
    }

    fn data_key(&self, key: &str) -> String {
        format!("cave:{}:{}", self.tome_id, key)
    }

    fn index_key(&self) -> String {
        format!("cave:{}:{}", self.tome_id, KEY_INDEX)
    }

    async fn known_keys(&self) -> StoreResult<Vec<String>> {
        let raw = self.client.kv_get(&self.index_key()).await?;
        let keys = match raw {
            None => Vec::new(),
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|_| {
                // A torn index loses history but must not wedge the tome.
                debug!(tome = %self.tome_id, "resetting malformed key index");
                Vec::new()
            }),
        };
        Ok(keys)
    }
}

#[async_trait]
impl<C: KvClient> CaveDb for KvCaveDb<C> {
    fn tome_id(&self) -> &str {
        &self.tome_id
    }

    async fn put(&self, key: &str, value: Value) -> StoreResult<Document> {
        let doc = stamp(&self.tome_id, key, value);
        let json = serde_json::to_string(&doc).map_err(|source| StoreError::Decode {
            location: self.data_key(key),
            source,
        })?;
        self.client.kv_set(&self.data_key(key), json).await?;
        let mut keys = self.known_keys().await?;
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
            let index = serde_json::to_string(&keys).map_err(|source| StoreError::Decode {
                location: self.index_key(),
                source,
            })?;
            self.client.kv_set(&self.index_key(), index).await?;
        }
        Ok(doc)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Document>> {
        let raw = self.client.kv_get(&self.data_key(key)).await?;
        match raw {
            None => Ok(None),
            Some(json) => {
                let doc = serde_json::from_str(&json).map_err(|source| StoreError::Decode {
                    location: self.data_key(key),
                    source,
                })?;
                Ok(Some(doc))
            }
        }
    }

    async fn find(&self, selector: Option<&Selector>) -> StoreResult<Vec<Document>> {
        let mut hits = Vec::new();
        for key in self.known_keys().await? {
            if key == KEY_INDEX {
                continue;
            }
            let Some(doc) = self.get(&key).await? else {
                continue;
            };
            let keep = match selector {
                Some(sel) => matches_selector(&doc, sel),
                None => true,
            };
            if keep {
                hits.push(doc);
            }
        }
        Ok(hits)
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// In-process [`KvClient`], the stand-in for a real cache in tests and
/// single-node deployments.
#[derive(Debug, Default)]
pub struct InProcessKv {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InProcessKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvClient for InProcessKv {
    async fn kv_get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn kv_set(&self, key: &str, value: String) -> StoreResult<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }
}
