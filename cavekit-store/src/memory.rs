//! In-memory backend, the reference implementation of the contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::adapter::{matches_selector, stamp, CaveDb, Document, Selector};
use crate::error::StoreResult;

/// Map-backed store. Deterministic `find` order (key order), suitable
/// for tests and as the fallback when a configured backend cannot be
/// built.
#[derive(Debug, Default)]
pub struct MemoryCaveDb {
    tome_id: String,
    docs: Mutex<BTreeMap<String, Document>>,
}

impl MemoryCaveDb {
    pub fn new(tome_id: impl Into<String>) -> Self {
        Self {
            tome_id: tome_id.into(),
            docs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Number of documents currently held.
    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }
}

#[async_trait]
impl CaveDb for MemoryCaveDb {
    fn tome_id(&self) -> &str {
        &self.tome_id
    }

    async fn put(&self, key: &str, value: Value) -> StoreResult<Document> {
        let doc = stamp(&self.tome_id, key, value);
        self.docs.lock().insert(key.to_string(), doc.clone());
        Ok(doc)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Document>> {
        Ok(self.docs.lock().get(key).cloned())
    }

    async fn find(&self, selector: Option<&Selector>) -> StoreResult<Vec<Document>> {
        let docs = self.docs.lock();
        let hits = docs
            .values()
            .filter(|doc| match selector {
                Some(sel) => matches_selector(doc, sel),
                None => true,
            })
            .cloned()
            .collect();
        Ok(hits)
    }

    async fn close(&self) -> StoreResult<()> {
        self.docs.lock().clear();
        Ok(())
    }
}
