//! File-embedded backend: one JSON document map per tome.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::adapter::{matches_selector, stamp, CaveDb, Document, Selector};
use crate::error::{StoreError, StoreResult};

/// Durable store without a server: the whole document map lives in
/// `<data_dir>/<tome_id>.json`, loaded on open and rewritten on every
/// `put`. The mutex is held across the rewrite so concurrent puts
/// serialize and no write clobbers a later one.
#[derive(Debug)]
pub struct FileCaveDb {
    tome_id: String,
    path: PathBuf,
    docs: Mutex<BTreeMap<String, Document>>,
}

impl FileCaveDb {
    /// Opens (or creates) the store for `tome_id` under `data_dir`.
    pub async fn open(data_dir: impl AsRef<Path>, tome_id: impl Into<String>) -> StoreResult<Self> {
        let tome_id = tome_id.into();
        let dir = data_dir.as_ref();
        tokio::fs::create_dir_all(dir).await.map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(format!("{tome_id}.json"));
        let docs = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
                location: path.display().to_string(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };
        debug!(tome = %tome_id, path = %path.display(), "opened file store");
        Ok(Self {
            tome_id,
            path,
            docs: Mutex::new(docs),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, docs: &BTreeMap<String, Document>) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(docs).map_err(|source| StoreError::Decode {
            location: self.path.display().to_string(),
            source,
        })?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

#[async_trait]
impl CaveDb for FileCaveDb {
    fn tome_id(&self) -> &str {
        &self.tome_id
    }

    async fn put(&self, key: &str, value: Value) -> StoreResult<Document> {
        let doc = stamp(&self.tome_id, key, value);
        let mut docs = self.docs.lock().await;
        docs.insert(key.to_string(), doc.clone());
        self.persist(&docs).await?;
        Ok(doc)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Document>> {
        Ok(self.docs.lock().await.get(key).cloned())
    }

    async fn find(&self, selector: Option<&Selector>) -> StoreResult<Vec<Document>> {
        let docs = self.docs.lock().await;
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
        let docs = self.docs.lock().await;
        self.persist(&docs).await
    }
}
