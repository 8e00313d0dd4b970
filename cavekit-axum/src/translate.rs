//! Conversions between axum's request/response types and the host-neutral
//! shapes routes are written against, plus the shared request pipeline
//! every route goes through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::body::to_bytes;
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::MethodRouter;
use parking_lot::RwLock;

use cavekit_server::{
    Middleware, MiddlewareOutcome, NormalizedRequest, NormalizedResponse, RequestStats,
    ResourceMonitor, RouteDef,
};
use cavekit_types::RouteMethod;

/// Largest request body the adapter buffers before handing it to a route.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Flattens an axum request into the host-neutral shape.
///
/// Header names are lowercased; non-UTF-8 header values are dropped. The
/// body is parsed as JSON when present and silently `None` when empty or
/// unparseable, so routes decide for themselves whether a body was
/// required. Query values are kept raw, without percent-decoding.
pub async fn normalize_request(request: Request) -> NormalizedRequest {
    let (parts, body) = request.into_parts();
    let method = parts.method.as_str().to_uppercase();
    let url = parts.uri.to_string();
    let path = parts.uri.path().to_string();

    let mut query = HashMap::new();
    if let Some(raw) = parts.uri.query() {
        for pair in raw.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            query.insert(key.to_string(), value.to_string());
        }
    }

    let mut headers = HashMap::new();
    for (name, value) in &parts.headers {
        if let Ok(text) = value.to_str() {
            headers.insert(name.as_str().to_lowercase(), text.to_string());
        }
    }

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) if bytes.is_empty() => None,
        Ok(bytes) => serde_json::from_slice(&bytes).ok(),
        Err(_) => None,
    };

    NormalizedRequest {
        method,
        url,
        path,
        query,
        headers,
        body,
    }
}

/// Renders a normalized response back into an axum response. Headers the
/// HTTP layer cannot represent are dropped with a warning rather than
/// failing the whole response.
pub fn into_axum_response(response: NormalizedResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = (status, axum::Json(response.body)).into_response();
    for (name, value) in response.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(header_name), Ok(header_value)) => {
                out.headers_mut().insert(header_name, header_value);
            }
            _ => tracing::warn!(header = %name, "dropping unrepresentable response header"),
        }
    }
    out
}

/// Wraps one route definition in the shared pipeline: normalize the
/// request, run the installed middlewares in order (any of them may
/// answer early), invoke the handler, record the request with the
/// monitor, and render the response.
///
/// The middleware list is read per request, so middleware installed by a
/// later plugin still applies to routes wired up before it.
pub fn method_route(
    route: RouteDef,
    middlewares: Arc<RwLock<Vec<Middleware>>>,
    monitor: Arc<dyn ResourceMonitor>,
) -> MethodRouter {
    let method = route.method;
    let handler = move |request: Request| {
        let route = route.clone();
        let middlewares = Arc::clone(&middlewares);
        let monitor = Arc::clone(&monitor);
        async move {
            let started = Instant::now();
            let mut current = normalize_request(request).await;
            let chain: Vec<Middleware> = middlewares.read().clone();
            for middleware in chain {
                match middleware(current).await {
                    MiddlewareOutcome::Continue(next) => current = next,
                    MiddlewareOutcome::Respond(early) => {
                        record(&monitor, &route, early.status, started);
                        return into_axum_response(early);
                    }
                }
            }
            let response = (route.handler)(current).await;
            record(&monitor, &route, response.status, started);
            into_axum_response(response)
        }
    };
    match method {
        RouteMethod::Get => axum::routing::get(handler),
        RouteMethod::Post => axum::routing::post(handler),
        RouteMethod::Put => axum::routing::put(handler),
        RouteMethod::Delete => axum::routing::delete(handler),
        RouteMethod::Patch => axum::routing::patch(handler),
    }
}

fn record(monitor: &Arc<dyn ResourceMonitor>, route: &RouteDef, status: u16, started: Instant) {
    monitor.record_request(RequestStats {
        method: route.method.as_str().to_string(),
        path: route.path.clone(),
        status,
        duration_ms: started.elapsed().as_millis() as u64,
    });
}
