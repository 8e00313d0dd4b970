//! The plugin contract: one mandatory `apply`, optional capabilities.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cavekit_types::RouteMethod;

use crate::context::CaveServerContext;
use crate::error::AdapterError;

/// Host-neutral request shape. Header names are lowercased; `body` is
/// parsed JSON when the host saw any.
#[derive(Debug, Clone, Default)]
pub struct NormalizedRequest {
    pub method: String,
    pub url: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

impl NormalizedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Host-neutral response shape.
#[derive(Debug, Clone)]
pub struct NormalizedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

impl NormalizedResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body,
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }
}

/// Async handler behind a normalized route.
pub type RouteHandler =
    Arc<dyn Fn(NormalizedRequest) -> BoxFuture<'static, NormalizedResponse> + Send + Sync>;

/// One route an adapter asks a host to expose.
#[derive(Clone)]
pub struct RouteDef {
    pub method: RouteMethod,
    pub path: String,
    pub handler: RouteHandler,
}

impl RouteDef {
    pub fn new(
        method: RouteMethod,
        path: impl Into<String>,
        handler: impl Fn(NormalizedRequest) -> BoxFuture<'static, NormalizedResponse>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            handler: Arc::new(handler),
        }
    }
}

impl std::fmt::Debug for RouteDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDef")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish()
    }
}

/// What a request interceptor decides: pass the (possibly rewritten)
/// request on, or answer it here.
pub enum MiddlewareOutcome {
    Continue(NormalizedRequest),
    Respond(NormalizedResponse),
}

/// Async request interceptor, run in installation order before the
/// route handler.
pub type Middleware =
    Arc<dyn Fn(NormalizedRequest) -> BoxFuture<'static, MiddlewareOutcome> + Send + Sync>;

/// Capability: the adapter accepts individual route registrations.
pub trait RouteRegistrar: Send + Sync {
    fn register_route(&self, route: RouteDef);
}

/// Capability: the adapter accepts a bag of routes under a base path.
pub trait RouteMounter: Send + Sync {
    fn mount(&self, base_path: &str, routes: Vec<RouteDef>);
}

/// Capability: the adapter accepts request middleware.
pub trait MiddlewareHost: Send + Sync {
    fn install(&self, middleware: Middleware);
}

/// Capability: the adapter can expose a liveness route.
pub trait HealthCheck: Send + Sync {
    fn register_health_check(&self, path: Option<&str>, interval_ms: Option<u64>);
}

/// Declarative retry hints an adapter may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

/// Declarative circuit-breaker hints an adapter may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub threshold: u32,
    pub reset_ms: u64,
}

/// A server plugin.
///
/// `apply` is the whole mandatory surface. Everything else is a
/// capability: hosts and orchestrators probe the accessors instead of
/// guessing, and [`AdapterCapabilities::of`] snapshots the answers at
/// registration time.
#[async_trait]
pub trait ServerAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Contributes this plugin's behavior to the deployment. Called
    /// exactly once per startup, in plugin-list order.
    async fn apply(&self, context: &CaveServerContext) -> Result<(), AdapterError>;

    fn routes(&self) -> Option<&dyn RouteRegistrar> {
        None
    }

    fn mounts(&self) -> Option<&dyn RouteMounter> {
        None
    }

    fn middleware(&self) -> Option<&dyn MiddlewareHost> {
        None
    }

    fn health(&self) -> Option<&dyn HealthCheck> {
        None
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        None
    }

    fn circuit_breaker(&self) -> Option<CircuitBreakerConfig> {
        None
    }
}

/// Which capabilities an adapter answered for, snapshotted when the
/// plugin list is assembled.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AdapterCapabilities {
    pub routes: bool,
    pub mounts: bool,
    pub middleware: bool,
    pub health: bool,
    pub retry_policy: bool,
    pub circuit_breaker: bool,
}

impl AdapterCapabilities {
    pub fn of(adapter: &dyn ServerAdapter) -> Self {
        Self {
            routes: adapter.routes().is_some(),
            mounts: adapter.mounts().is_some(),
            middleware: adapter.middleware().is_some(),
            health: adapter.health().is_some(),
            retry_policy: adapter.retry_policy().is_some(),
            circuit_breaker: adapter.circuit_breaker().is_some(),
        }
    }
}
