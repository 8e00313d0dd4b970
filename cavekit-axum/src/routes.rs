//! The built-in normalized route handlers: machine dispatch, the editor
//! store, the cave registry, tome status, and health.
//!
//! Handlers are built against [`NormalizedRequest`] so they stay
//! host-neutral; [`crate::translate`] owns the axum wiring.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use cavekit_core::{evaluate_permission, Cave, TomeManager};
use cavekit_server::{NormalizedRequest, NormalizedResponse, ResourceMonitor, RouteHandler};
use cavekit_store::PersistenceRegistry;
use cavekit_types::CaveUser;

use crate::adapter::PermissionPolicy;

/// Resolves the acting user from the `x-cave-user` and
/// `x-cave-permission-level` headers; absent headers mean anonymous.
pub fn user_from_request(request: &NormalizedRequest) -> CaveUser {
    let id = request.header("x-cave-user").unwrap_or("anonymous");
    let level = request
        .header("x-cave-permission-level")
        .unwrap_or("anonymous");
    CaveUser::new(id, level)
}

/// Dispatch route for one `(tome, machine)` pair.
///
/// Expects `{ "event": "...", "data": ... }`; replies with the machine's
/// snapshot after the event, stamped with a timestamp and a request id.
/// An unhandled event still answers 200 with the unchanged snapshot;
/// dispatch failures (machine never started, tome unregistered
/// meanwhile) answer 500 with the cause.
pub fn dispatch_route(
    manager: Arc<TomeManager>,
    tome_id: String,
    machine: String,
    permission: Option<PermissionPolicy>,
) -> RouteHandler {
    Arc::new(move |request: NormalizedRequest| {
        let manager = Arc::clone(&manager);
        let tome_id = tome_id.clone();
        let machine = machine.clone();
        let permission = permission.clone();
        Box::pin(async move {
            if let Some(policy) = &permission {
                let user = user_from_request(&request);
                if !evaluate_permission(&user, &policy.rule, &policy.level_order) {
                    return NormalizedResponse::json(
                        403,
                        json!({ "success": false, "error": "permission denied" }),
                    );
                }
            }
            let Some(body) = request.body else {
                return NormalizedResponse::json(
                    400,
                    json!({ "success": false, "error": "expected a JSON body" }),
                );
            };
            let Some(event) = body.get("event").and_then(Value::as_str).map(str::to_string)
            else {
                return NormalizedResponse::json(
                    400,
                    json!({ "success": false, "error": "missing \"event\"" }),
                );
            };
            let data = body.get("data").cloned();
            match manager.send_to(&tome_id, &machine, &event, data).await {
                Ok(snapshot) => NormalizedResponse::ok(json!({
                    "success": true,
                    "tome": tome_id,
                    "machine": machine,
                    "event": event,
                    "result": snapshot,
                    "timestamp": Utc::now().to_rfc3339(),
                    "request_id": Uuid::new_v4().to_string(),
                })),
                Err(err) => NormalizedResponse::json(
                    500,
                    json!({
                        "success": false,
                        "tome": tome_id,
                        "machine": machine,
                        "event": event,
                        "error": err.to_string(),
                        "timestamp": Utc::now().to_rfc3339(),
                        "request_id": Uuid::new_v4().to_string(),
                    }),
                ),
            }
        })
    })
}

fn split_store_path(path: &str, base: &str) -> Option<(String, String)> {
    let rest = path.strip_prefix(base)?.trim_start_matches('/');
    let (tome_id, key) = rest.split_once('/')?;
    if tome_id.is_empty() || key.is_empty() {
        return None;
    }
    Some((tome_id.to_string(), key.to_string()))
}

/// `GET <base>/{tome_id}/{key}`: the stored document, or JSON `null`
/// when the key was never written.
pub fn store_get_route(registry: Arc<PersistenceRegistry>, base: String) -> RouteHandler {
    Arc::new(move |request: NormalizedRequest| {
        let registry = Arc::clone(&registry);
        let base = base.clone();
        Box::pin(async move {
            let Some((tome_id, key)) = split_store_path(&request.path, &base) else {
                return NormalizedResponse::json(
                    400,
                    json!({ "error": "expected {tome_id}/{key}" }),
                );
            };
            let adapter = registry.adapter_for(&tome_id);
            match adapter.get(&key).await {
                Ok(Some(document)) => NormalizedResponse::ok(Value::Object(document)),
                Ok(None) => NormalizedResponse::ok(Value::Null),
                Err(err) => NormalizedResponse::json(500, json!({ "error": err.to_string() })),
            }
        })
    })
}

/// `PUT <base>/{tome_id}/{key}`: full-replace upsert of the request body.
pub fn store_put_route(registry: Arc<PersistenceRegistry>, base: String) -> RouteHandler {
    Arc::new(move |request: NormalizedRequest| {
        let registry = Arc::clone(&registry);
        let base = base.clone();
        Box::pin(async move {
            let Some((tome_id, key)) = split_store_path(&request.path, &base) else {
                return NormalizedResponse::json(
                    400,
                    json!({ "error": "expected {tome_id}/{key}" }),
                );
            };
            let Some(body) = request.body else {
                return NormalizedResponse::json(400, json!({ "error": "expected a JSON body" }));
            };
            let adapter = registry.adapter_for(&tome_id);
            match adapter.put(&key, body).await {
                Ok(document) => {
                    NormalizedResponse::ok(json!({ "success": true, "document": document }))
                }
                Err(err) => NormalizedResponse::json(500, json!({ "error": err.to_string() })),
            }
        })
    })
}

/// The cave's address book: one entry per top-level child location.
pub fn registry_route(cave: Arc<Cave>) -> RouteHandler {
    Arc::new(move |_request: NormalizedRequest| {
        let cave = Arc::clone(&cave);
        Box::pin(async move {
            let addresses: Vec<Value> = cave
                .config()
                .spelunk
                .child_caves
                .iter()
                .map(|(segment, child)| {
                    json!({
                        "name": segment,
                        "route": child.route,
                        "container": child.container,
                        "tome_id": child.tome_id,
                    })
                })
                .collect();
            NormalizedResponse::ok(json!({
                "cave": cave.name(),
                "addresses": addresses,
            }))
        })
    })
}

/// Current state of every registered tome and machine.
pub fn status_route(manager: Arc<TomeManager>) -> RouteHandler {
    Arc::new(move |_request: NormalizedRequest| {
        let manager = Arc::clone(&manager);
        Box::pin(async move { NormalizedResponse::ok(json!({ "tomes": manager.status() })) })
    })
}

/// Liveness plus the two degradation signals worth surfacing: request
/// volume and any persistence fallbacks taken at startup.
pub fn health_route(
    cave_name: String,
    manager: Arc<TomeManager>,
    store: Option<Arc<PersistenceRegistry>>,
    monitor: Arc<dyn ResourceMonitor>,
) -> RouteHandler {
    Arc::new(move |_request: NormalizedRequest| {
        let cave_name = cave_name.clone();
        let manager = Arc::clone(&manager);
        let store = store.clone();
        let monitor = Arc::clone(&monitor);
        Box::pin(async move {
            let fallbacks = store
                .as_ref()
                .map(|registry| registry.fallback_events())
                .unwrap_or_default();
            NormalizedResponse::ok(json!({
                "status": "ok",
                "cave": cave_name,
                "tomes": manager.list_tomes(),
                "requests": monitor.request_count(),
                "fallbacks": fallbacks,
            }))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_path_splits_into_tome_and_key() {
        assert_eq!(
            split_store_path("/api/editor/store/orders/o-1", "/api/editor/store"),
            Some(("orders".to_string(), "o-1".to_string()))
        );
        // Extra segments stay part of the key.
        assert_eq!(
            split_store_path("/api/editor/store/orders/a/b", "/api/editor/store"),
            Some(("orders".to_string(), "a/b".to_string()))
        );
        assert_eq!(split_store_path("/api/editor/store/orders", "/api/editor/store"), None);
        assert_eq!(split_store_path("/elsewhere/orders/o-1", "/api/editor/store"), None);
    }

    #[test]
    fn test_user_resolution_defaults_to_anonymous() {
        let request = NormalizedRequest::default();
        let user = user_from_request(&request);
        assert_eq!(user.id, "anonymous");
        assert_eq!(user.permission_level, "anonymous");

        let mut request = NormalizedRequest::default();
        request
            .headers
            .insert("x-cave-user".to_string(), "ada".to_string());
        request
            .headers
            .insert("x-cave-permission-level".to_string(), "admin".to_string());
        let user = user_from_request(&request);
        assert_eq!(user.id, "ada");
        assert_eq!(user.permission_level, "admin");
    }
}
