//! The axum host adapter.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use parking_lot::{Mutex, RwLock};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use cavekit_core::{Cave, TomeManager, DEFAULT_LEVEL_ORDER};
use cavekit_server::{
    AdapterError, CaveServerContext, HealthCheck, Middleware, MiddlewareHost, ResourceMonitor,
    RouteDef, RouteMounter, RouteRegistrar, ServerAdapter,
};
use cavekit_store::PersistenceRegistry;
use cavekit_types::{RouteMethod, TomeConfig};

use crate::routes;
use crate::translate;

/// Where the editor store routes hang.
const STORE_BASE: &str = "/api/editor/store";

/// Permission gate applied to every dispatch route.
#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    /// Expression such as `">=user"` or `"admin,editor"`.
    pub rule: String,
    pub level_order: Vec<String>,
}

impl PermissionPolicy {
    pub fn new(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            level_order: DEFAULT_LEVEL_ORDER.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_level_order(mut self, order: Vec<String>) -> Self {
        self.level_order = order;
        self
    }
}

/// Knobs of the axum host adapter.
#[derive(Debug, Clone, Default)]
pub struct AxumAdapterOptions {
    /// Path of the registry route; `/registry` when unset. The route
    /// only exists when the deployment enables the `registry` section.
    pub registry_path: Option<String>,
    /// When set, dispatch routes check the caller against this policy.
    pub permission: Option<PermissionPolicy>,
}

/// What `apply` captured from the server context, frozen for routing.
#[derive(Clone)]
struct AppliedState {
    cave: Arc<Cave>,
    manager: Arc<TomeManager>,
    tome_configs: Vec<TomeConfig>,
    store: Option<Arc<PersistenceRegistry>>,
    monitor: Arc<dyn ResourceMonitor>,
    registry_route_path: Option<String>,
}

/// The host adapter: builds the tome manager during `apply`, collects
/// routes and middleware from other plugins through the capability
/// traits, and assembles the final [`axum::Router`].
pub struct AxumCaveAdapter {
    options: AxumAdapterOptions,
    state: Mutex<Option<AppliedState>>,
    custom_routes: Mutex<Vec<RouteDef>>,
    middlewares: Arc<RwLock<Vec<Middleware>>>,
    health_path: Mutex<Option<String>>,
}

impl AxumCaveAdapter {
    pub fn new(options: AxumAdapterOptions) -> Self {
        Self {
            options,
            state: Mutex::new(None),
            custom_routes: Mutex::new(Vec::new()),
            middlewares: Arc::new(RwLock::new(Vec::new())),
            health_path: Mutex::new(None),
        }
    }

    /// The tome manager built during `apply`, once `apply` has run.
    pub fn tome_manager(&self) -> Option<Arc<TomeManager>> {
        self.state
            .lock()
            .as_ref()
            .map(|state| Arc::clone(&state.manager))
    }

    /// Assembles the router from everything `apply` and the capability
    /// calls contributed. Before `apply` this answers an empty router.
    pub fn into_router(&self) -> Router {
        let Some(state) = self.state.lock().clone() else {
            warn!("router requested before apply; answering an empty router");
            return Router::new();
        };

        let mut router = Router::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        // Dispatch routes: the key of each route binding names the
        // target machine inside the tome.
        for config in &state.tome_configs {
            let Some(routing) = &config.routing else {
                continue;
            };
            for (route_name, binding) in &routing.routes {
                if !config.machines.contains_key(route_name) {
                    warn!(
                        tome = %config.id,
                        route = %route_name,
                        "route names no machine in its tome; skipping"
                    );
                    continue;
                }
                let path = join_paths(&routing.base_path, &binding.path);
                let handler = routes::dispatch_route(
                    Arc::clone(&state.manager),
                    config.id.clone(),
                    route_name.clone(),
                    self.options.permission.clone(),
                );
                router = self.add_route(
                    router,
                    &mut seen,
                    RouteDef {
                        method: binding.method,
                        path,
                        handler,
                    },
                    &state.monitor,
                );
            }
        }

        router = self.add_route(
            router,
            &mut seen,
            RouteDef {
                method: RouteMethod::Get,
                path: "/api/tomes".to_string(),
                handler: routes::status_route(Arc::clone(&state.manager)),
            },
            &state.monitor,
        );

        if let Some(store) = &state.store {
            let path = format!("{STORE_BASE}/{{tome_id}}/{{key}}");
            router = self.add_route(
                router,
                &mut seen,
                RouteDef {
                    method: RouteMethod::Get,
                    path: path.clone(),
                    handler: routes::store_get_route(Arc::clone(store), STORE_BASE.to_string()),
                },
                &state.monitor,
            );
            router = self.add_route(
                router,
                &mut seen,
                RouteDef {
                    method: RouteMethod::Put,
                    path,
                    handler: routes::store_put_route(Arc::clone(store), STORE_BASE.to_string()),
                },
                &state.monitor,
            );
        }

        if let Some(path) = &state.registry_route_path {
            router = self.add_route(
                router,
                &mut seen,
                RouteDef {
                    method: RouteMethod::Get,
                    path: path.clone(),
                    handler: routes::registry_route(Arc::clone(&state.cave)),
                },
                &state.monitor,
            );
        }

        for route in self.custom_routes.lock().clone() {
            router = self.add_route(router, &mut seen, route, &state.monitor);
        }

        if let Some(path) = self.health_path.lock().clone() {
            router = self.add_route(
                router,
                &mut seen,
                RouteDef {
                    method: RouteMethod::Get,
                    path,
                    handler: routes::health_route(
                        state.cave.name().to_string(),
                        Arc::clone(&state.manager),
                        state.store.clone(),
                        Arc::clone(&state.monitor),
                    ),
                },
                &state.monitor,
            );
        }

        router.layer(TraceLayer::new_for_http())
    }

    /// Registers one wrapped route, skipping malformed paths and exact
    /// `(method, path)` duplicates instead of letting axum panic.
    fn add_route(
        &self,
        router: Router,
        seen: &mut HashSet<(String, String)>,
        route: RouteDef,
        monitor: &Arc<dyn ResourceMonitor>,
    ) -> Router {
        if !route.path.starts_with('/') {
            warn!(path = %route.path, "route paths must start with '/'; skipping");
            return router;
        }
        let key = (route.method.as_str().to_string(), route.path.clone());
        if !seen.insert(key) {
            warn!(
                method = route.method.as_str(),
                path = %route.path,
                "duplicate route; keeping the first"
            );
            return router;
        }
        debug!(method = route.method.as_str(), path = %route.path, "mounting route");
        let path = route.path.clone();
        router.route(
            &path,
            translate::method_route(route, Arc::clone(&self.middlewares), Arc::clone(monitor)),
        )
    }
}

impl Default for AxumCaveAdapter {
    fn default() -> Self {
        Self::new(AxumAdapterOptions::default())
    }
}

#[async_trait]
impl ServerAdapter for AxumCaveAdapter {
    fn name(&self) -> &str {
        "axum-cave-adapter"
    }

    /// Builds the tome manager, registers and starts every configured
    /// tome, and publishes the manager for plugins applied later.
    async fn apply(&self, context: &CaveServerContext) -> Result<(), AdapterError> {
        let manager = Arc::new(TomeManager::new());
        for config in &context.tome_configs {
            manager.register_tome(config.clone())?;
            manager.start_tome(&config.id).await?;
        }
        context.tome_manager.set(Arc::clone(&manager));

        let registry_route_path = if context.sections.enabled("registry") {
            Some(
                self.options
                    .registry_path
                    .clone()
                    .unwrap_or_else(|| "/registry".to_string()),
            )
        } else {
            None
        };

        info!(
            cave = %context.cave.name(),
            tomes = context.tome_configs.len(),
            "axum adapter applied"
        );
        *self.state.lock() = Some(AppliedState {
            cave: Arc::clone(&context.cave),
            manager,
            tome_configs: context.tome_configs.clone(),
            store: context.store.clone(),
            monitor: Arc::clone(&context.monitor),
            registry_route_path,
        });
        Ok(())
    }

    fn routes(&self) -> Option<&dyn RouteRegistrar> {
        Some(self)
    }

    fn mounts(&self) -> Option<&dyn RouteMounter> {
        Some(self)
    }

    fn middleware(&self) -> Option<&dyn MiddlewareHost> {
        Some(self)
    }

    fn health(&self) -> Option<&dyn HealthCheck> {
        Some(self)
    }
}

impl RouteRegistrar for AxumCaveAdapter {
    fn register_route(&self, route: RouteDef) {
        self.custom_routes.lock().push(route);
    }
}

impl RouteMounter for AxumCaveAdapter {
    fn mount(&self, base_path: &str, routes: Vec<RouteDef>) {
        let mut custom = self.custom_routes.lock();
        for mut route in routes {
            route.path = join_paths(base_path, &route.path);
            custom.push(route);
        }
    }
}

impl MiddlewareHost for AxumCaveAdapter {
    fn install(&self, middleware: Middleware) {
        self.middlewares.write().push(middleware);
    }
}

impl HealthCheck for AxumCaveAdapter {
    fn register_health_check(&self, path: Option<&str>, _interval_ms: Option<u64>) {
        *self.health_path.lock() = Some(path.unwrap_or("/healthz").to_string());
    }
}

/// Joins a base path and a route path into one absolute path.
fn join_paths(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        if base.is_empty() {
            "/".to_string()
        } else {
            base.to_string()
        }
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_paths_normalizes_slashes() {
        assert_eq!(join_paths("/api/orders", "/checkout"), "/api/orders/checkout");
        assert_eq!(join_paths("/api/orders/", "checkout"), "/api/orders/checkout");
        assert_eq!(join_paths("", "/checkout"), "/checkout");
        assert_eq!(join_paths("/", "/checkout"), "/checkout");
        assert_eq!(join_paths("/api/orders", ""), "/api/orders");
        assert_eq!(join_paths("", ""), "/");
    }

    #[test]
    fn test_permission_policy_defaults_to_standard_levels() {
        let policy = PermissionPolicy::new(">=user");
        assert_eq!(policy.level_order, vec!["anonymous", "user", "admin"]);
        let policy = policy.with_level_order(vec!["guest".to_string(), "vip".to_string()]);
        assert_eq!(policy.level_order, vec!["guest", "vip"]);
    }
}
