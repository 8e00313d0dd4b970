//! The [`CaveDb`] contract and the document rules every backend shares.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreResult;

/// A stored document: a JSON object carrying the adapter-injected
/// `_id` (the key) and `_tomeId` fields alongside caller data.
pub type Document = Map<String, Value>;

/// Exact-match filter: every key must exist on the document with an
/// equal value. No operators, no nested paths.
pub type Selector = Map<String, Value>;

/// Applies the tagged-document rule and injects identity fields.
///
/// Objects are stored verbatim; anything else (including `null` and
/// arrays) is wrapped as `{"value": v}`. `_id` and `_tomeId` are then
/// written over whatever the caller supplied.
pub fn stamp(tome_id: &str, key: &str, value: Value) -> Document {
    let mut doc = match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    doc.insert("_id".to_string(), Value::String(key.to_string()));
    doc.insert("_tomeId".to_string(), Value::String(tome_id.to_string()));
    doc
}

/// True when `doc` satisfies `selector` (conjunction of strict
/// equalities).
pub fn matches_selector(doc: &Document, selector: &Selector) -> bool {
    selector.iter().all(|(k, v)| doc.get(k) == Some(v))
}

/// Uniform per-tome document store.
///
/// One instance is bound to exactly one tome id at construction; two
/// instances with different tome ids never see each other's documents,
/// even on a shared physical backend. `put` is a full-replace upsert
/// keyed by `(tome_id, key)`.
#[async_trait]
pub trait CaveDb: Send + Sync {
    /// The tome this store is bound to.
    fn tome_id(&self) -> &str;

    /// Upserts `value` under `key`, replacing any prior document
    /// entirely, and returns the document as stored.
    async fn put(&self, key: &str, value: Value) -> StoreResult<Document>;

    /// Fetches the document under `key`, `None` when absent.
    async fn get(&self, key: &str) -> StoreResult<Option<Document>>;

    /// All documents of this tome matching `selector`; no selector (or
    /// an empty one) returns everything.
    async fn find(&self, selector: Option<&Selector>) -> StoreResult<Vec<Document>>;

    /// First match of [`CaveDb::find`], `None` when nothing matches.
    async fn find_one(&self, selector: Option<&Selector>) -> StoreResult<Option<Document>> {
        Ok(self.find(selector).await?.into_iter().next())
    }

    /// Releases backend resources.
    async fn close(&self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stamp_keeps_objects_verbatim() {
        let doc = stamp("orders", "o-1", json!({ "total": 12 }));
        assert_eq!(doc.get("total"), Some(&json!(12)));
        assert_eq!(doc.get("_id"), Some(&json!("o-1")));
        assert_eq!(doc.get("_tomeId"), Some(&json!("orders")));
    }

    #[test]
    fn test_stamp_wraps_non_objects() {
        let doc = stamp("orders", "o-2", json!([1, 2, 3]));
        assert_eq!(doc.get("value"), Some(&json!([1, 2, 3])));
        let doc = stamp("orders", "o-3", Value::Null);
        assert_eq!(doc.get("value"), Some(&Value::Null));
    }

    #[test]
    fn test_stamp_overwrites_caller_identity_fields() {
        let doc = stamp("orders", "o-4", json!({ "_id": "sneaky", "_tomeId": "other" }));
        assert_eq!(doc.get("_id"), Some(&json!("o-4")));
        assert_eq!(doc.get("_tomeId"), Some(&json!("orders")));
    }

    #[test]
    fn test_selector_is_a_conjunction_of_equalities() {
        let doc = stamp("t", "k", json!({ "status": "open", "total": 12 }));
        let sel: Selector = json!({ "status": "open" }).as_object().unwrap().clone();
        assert!(matches_selector(&doc, &sel));
        let sel: Selector = json!({ "status": "open", "total": 13 })
            .as_object()
            .unwrap()
            .clone();
        assert!(!matches_selector(&doc, &sel));
        let sel: Selector = json!({ "missing": null }).as_object().unwrap().clone();
        assert!(!matches_selector(&doc, &sel));
    }
}
