//! End-to-end requests through the assembled router.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use cavekit_axum::{AxumAdapterOptions, AxumCaveAdapter, PermissionPolicy};
use cavekit_core::Cave;
use cavekit_server::{
    create_cave_server, CaveServerContext, CaveServerSpec, HealthCheck, Middleware,
    MiddlewareHost, MiddlewareOutcome, NormalizedResponse, RouteDef, RouteMounter, RouteRegistrar,
    Sections,
};
use cavekit_store::{AdapterFactories, PersistenceRegistry};
use cavekit_types::{CaveConfig, RouteMethod, TomeConfig};

fn cave() -> Arc<Cave> {
    let spelunk = serde_json::from_value(json!({
        "child_caves": {
            "editor": { "route": "/editor", "container": "workbench", "tome_id": "orders" },
            "vault": { "route": "/vault" }
        }
    }))
    .unwrap();
    Arc::new(Cave::new(CaveConfig::new("demo-cave", spelunk)))
}

fn orders_tome() -> TomeConfig {
    serde_json::from_value(json!({
        "id": "orders",
        "name": "Orders",
        "machines": {
            "checkout": {
                "id": "checkout",
                "initial": "cart",
                "states": {
                    "cart": { "on": { "PAY": "paid" } },
                    "paid": { "on": { "RESET": "cart" } }
                },
                "context": { "total": 0 }
            }
        },
        "routing": {
            "base_path": "/api/orders",
            "routes": {
                "checkout": { "path": "/checkout" }
            }
        },
        "persistence": { "enabled": true, "adapter": "memory" }
    }))
    .unwrap()
}

async fn serve(adapter: Arc<AxumCaveAdapter>, sections: Sections) -> (Router, CaveServerContext) {
    let configs = vec![orders_tome()];
    let store = Arc::new(
        PersistenceRegistry::build(&configs, &AdapterFactories::with_defaults(None)).await,
    );
    let context = create_cave_server(
        CaveServerSpec::new(cave())
            .with_tomes(configs)
            .with_sections(sections)
            .with_store(store)
            .with_plugin(adapter.clone()),
    )
    .await
    .unwrap();
    (adapter.into_router(), context)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_dispatch_round_trip_reports_the_new_snapshot() {
    let adapter = Arc::new(AxumCaveAdapter::default());
    let (router, _context) = serve(adapter, Sections::new()).await;

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/orders/checkout",
            json!({ "event": "PAY", "data": { "total": 9 } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["tome"], json!("orders"));
    assert_eq!(body["machine"], json!("checkout"));
    assert_eq!(body["event"], json!("PAY"));
    assert_eq!(body["result"]["state"], json!("paid"));
    assert_eq!(body["result"]["context"]["total"], json!(9));
    assert!(body["request_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn test_dispatch_requires_an_event() {
    let adapter = Arc::new(AxumCaveAdapter::default());
    let (router, _context) = serve(adapter, Sections::new()).await;

    let response = router
        .clone()
        .oneshot(json_request("POST", "/api/orders/checkout", json!({ "data": {} })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["success"], json!(false));

    let empty = Request::builder()
        .method("POST")
        .uri("/api/orders/checkout")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(empty).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unhandled_event_answers_the_unchanged_snapshot() {
    let adapter = Arc::new(AxumCaveAdapter::default());
    let (router, _context) = serve(adapter, Sections::new()).await;

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/orders/checkout",
            json!({ "event": "NONSENSE" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["result"]["state"], json!("cart"));
}

#[tokio::test]
async fn test_store_routes_put_then_get() {
    let adapter = Arc::new(AxumCaveAdapter::default());
    let (router, _context) = serve(adapter, Sections::new()).await;

    let response = router
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/editor/store/orders/o-1",
            json!({ "total": 5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["document"]["_id"], json!("o-1"));

    let response = router
        .clone()
        .oneshot(get("/api/editor/store/orders/o-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["_tomeId"], json!("orders"));
    assert_eq!(body["total"], json!(5));

    // Unknown keys answer JSON null, not 404.
    let response = router
        .oneshot(get("/api/editor/store/orders/ghost"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, Value::Null);
}

#[tokio::test]
async fn test_registry_route_is_section_gated() {
    let adapter = Arc::new(AxumCaveAdapter::default());
    let (router, _context) = serve(adapter, Sections::new().enable("registry")).await;
    let response = router.oneshot(get("/registry")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["cave"], json!("demo-cave"));
    let addresses = body["addresses"].as_array().unwrap();
    assert_eq!(addresses.len(), 2);
    assert!(addresses
        .iter()
        .any(|entry| entry["name"] == json!("editor") && entry["tome_id"] == json!("orders")));

    let adapter = Arc::new(AxumCaveAdapter::default());
    let (router, _context) = serve(adapter, Sections::new()).await;
    let response = router.oneshot(get("/registry")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_route_appears_once_registered() {
    let adapter = Arc::new(AxumCaveAdapter::default());
    adapter.register_health_check(None, None);
    let (router, _context) = serve(adapter, Sections::new()).await;
    let response = router.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["tomes"], json!(["orders"]));
    assert_eq!(body["fallbacks"], json!([]));
}

#[tokio::test]
async fn test_status_route_lists_machines() {
    let adapter = Arc::new(AxumCaveAdapter::default());
    let (router, _context) = serve(adapter, Sections::new()).await;
    let response = router.oneshot(get("/api/tomes")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["tomes"][0]["id"], json!("orders"));
    assert_eq!(body["tomes"][0]["machines"]["checkout"], json!("cart"));
}

#[tokio::test]
async fn test_apply_publishes_the_tome_manager() {
    let adapter = Arc::new(AxumCaveAdapter::default());
    let (_router, context) = serve(Arc::clone(&adapter), Sections::new()).await;
    let manager = context.tome_manager.get().expect("manager published");
    assert_eq!(
        manager.machine_state("orders", "checkout").as_deref(),
        Some("cart")
    );
    assert!(adapter.tome_manager().is_some());
}

#[tokio::test]
async fn test_dispatch_honors_the_permission_policy() {
    let adapter = Arc::new(AxumCaveAdapter::new(AxumAdapterOptions {
        permission: Some(PermissionPolicy::new(">anonymous")),
        ..Default::default()
    }));
    let (router, _context) = serve(adapter, Sections::new()).await;

    let denied = router
        .clone()
        .oneshot(json_request("POST", "/api/orders/checkout", json!({ "event": "PAY" })))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let allowed = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/orders/checkout")
                .header("content-type", "application/json")
                .header("x-cave-user", "ada")
                .header("x-cave-permission-level", "user")
                .body(Body::from(json!({ "event": "PAY" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_middleware_can_answer_early() {
    let adapter = Arc::new(AxumCaveAdapter::default());
    let blocker: Middleware = Arc::new(|request| {
        Box::pin(async move {
            if request.header("x-block") == Some("yes") {
                MiddlewareOutcome::Respond(NormalizedResponse::json(
                    418,
                    json!({ "blocked": true }),
                ))
            } else {
                MiddlewareOutcome::Continue(request)
            }
        })
    });
    adapter.install(blocker);
    let (router, context) = serve(adapter, Sections::new()).await;

    let blocked = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/orders/checkout")
                .header("content-type", "application/json")
                .header("x-block", "yes")
                .body(Body::from(json!({ "event": "PAY" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(blocked.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(body_json(blocked).await, json!({ "blocked": true }));
    // The machine never saw the blocked event.
    let manager = context.tome_manager.get().unwrap();
    assert_eq!(
        manager.machine_state("orders", "checkout").as_deref(),
        Some("cart")
    );

    let through = router
        .oneshot(json_request("POST", "/api/orders/checkout", json!({ "event": "PAY" })))
        .await
        .unwrap();
    assert_eq!(through.status(), StatusCode::OK);
    assert_eq!(
        manager.machine_state("orders", "checkout").as_deref(),
        Some("paid")
    );
}

#[tokio::test]
async fn test_plugin_contributed_routes_are_mounted() {
    let adapter = Arc::new(AxumCaveAdapter::default());
    adapter.register_route(RouteDef::new(RouteMethod::Get, "/custom/ping", |_request| {
        Box::pin(async move { NormalizedResponse::ok(json!({ "pong": true })) })
    }));
    adapter.mount(
        "/tools",
        vec![RouteDef::new(RouteMethod::Get, "/echo", |request| {
            Box::pin(async move { NormalizedResponse::ok(json!({ "path": request.path })) })
        })],
    );
    let (router, _context) = serve(adapter, Sections::new()).await;

    let response = router.clone().oneshot(get("/custom/ping")).await.unwrap();
    assert_eq!(body_json(response).await, json!({ "pong": true }));

    let response = router.oneshot(get("/tools/echo")).await.unwrap();
    assert_eq!(body_json(response).await["path"], json!("/tools/echo"));
}

#[tokio::test]
async fn test_monitor_counts_served_requests() {
    let adapter = Arc::new(AxumCaveAdapter::default());
    let (router, context) = serve(adapter, Sections::new()).await;
    assert_eq!(context.monitor.request_count(), 0);
    router
        .clone()
        .oneshot(json_request("POST", "/api/orders/checkout", json!({ "event": "PAY" })))
        .await
        .unwrap();
    router.oneshot(get("/api/tomes")).await.unwrap();
    assert_eq!(context.monitor.request_count(), 2);
}
