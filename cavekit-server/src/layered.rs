//! Section-filtered adapter layering.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::adapter::{
    CircuitBreakerConfig, HealthCheck, MiddlewareHost, RetryPolicy, RouteMounter, RouteRegistrar,
    ServerAdapter,
};
use crate::context::CaveServerContext;
use crate::error::AdapterError;

/// Wraps an adapter so its `apply` only runs when the deployment has at
/// least one of the named sections enabled.
///
/// Only `apply` is gated; every capability accessor forwards to the
/// wrapped adapter unconditionally, so hosts can still register routes
/// or middleware on it regardless of section state. An empty filter
/// never matches and permanently skips the wrapped `apply`.
pub struct SectionFiltered {
    name: String,
    inner: Arc<dyn ServerAdapter>,
    section_filter: Vec<String>,
}

impl SectionFiltered {
    pub fn new(
        inner: Arc<dyn ServerAdapter>,
        section_filter: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let section_filter: Vec<String> =
            section_filter.into_iter().map(Into::into).collect();
        Self {
            name: format!("layered({})", inner.name()),
            inner,
            section_filter,
        }
    }
}

#[async_trait]
impl ServerAdapter for SectionFiltered {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, context: &CaveServerContext) -> Result<(), AdapterError> {
        let wanted = self.section_filter.iter().map(String::as_str);
        if !context.sections.any_enabled(wanted) {
            debug!(
                adapter = %self.inner.name(),
                filter = ?self.section_filter,
                "no matching section enabled, skipping apply"
            );
            return Ok(());
        }
        self.inner.apply(context).await
    }

    fn routes(&self) -> Option<&dyn RouteRegistrar> {
        self.inner.routes()
    }

    fn mounts(&self) -> Option<&dyn RouteMounter> {
        self.inner.mounts()
    }

    fn middleware(&self) -> Option<&dyn MiddlewareHost> {
        self.inner.middleware()
    }

    fn health(&self) -> Option<&dyn HealthCheck> {
        self.inner.health()
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        self.inner.retry_policy()
    }

    fn circuit_breaker(&self) -> Option<CircuitBreakerConfig> {
        self.inner.circuit_breaker()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Sections, SlotCell};
    use crate::monitor::InMemoryResourceMonitor;
    use crate::shell::AppShellRegistry;
    use cavekit_core::Cave;
    use cavekit_types::CaveConfig;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    fn context_with_sections(sections: Sections) -> CaveServerContext {
        CaveServerContext {
            cave: Arc::new(Cave::new(CaveConfig::new("test", Default::default()))),
            tome_configs: Vec::new(),
            variables: HashMap::new(),
            sections,
            store: None,
            monitor: Arc::new(InMemoryResourceMonitor::new()),
            tome_manager: SlotCell::new(),
            app_shells: AppShellRegistry::new(),
        }
    }

    #[derive(Default)]
    struct Counting {
        applied: Mutex<usize>,
    }

    impl RetryPolicy {
        fn sample() -> Self {
            Self {
                max_retries: 3,
                backoff_ms: 50,
            }
        }
    }

    #[async_trait]
    impl ServerAdapter for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn apply(&self, _context: &CaveServerContext) -> Result<(), AdapterError> {
            *self.applied.lock() += 1;
            Ok(())
        }

        fn retry_policy(&self) -> Option<RetryPolicy> {
            Some(RetryPolicy::sample())
        }
    }

    #[tokio::test]
    async fn test_apply_forwards_when_a_section_matches() {
        let inner = Arc::new(Counting::default());
        let layered = SectionFiltered::new(
            Arc::clone(&inner) as Arc<dyn ServerAdapter>,
            ["registry", "store"],
        );
        let context = context_with_sections(Sections::new().enable("store"));
        layered.apply(&context).await.unwrap();
        assert_eq!(*inner.applied.lock(), 1);
    }

    #[tokio::test]
    async fn test_apply_skips_when_no_section_matches() {
        let inner = Arc::new(Counting::default());
        let layered =
            SectionFiltered::new(Arc::clone(&inner) as Arc<dyn ServerAdapter>, ["registry"]);
        let context = context_with_sections(Sections::new().enable("store"));
        layered.apply(&context).await.unwrap();
        assert_eq!(*inner.applied.lock(), 0);

        // An empty filter can never match.
        let empty = SectionFiltered::new(
            Arc::clone(&inner) as Arc<dyn ServerAdapter>,
            Vec::<String>::new(),
        );
        empty.apply(&context).await.unwrap();
        assert_eq!(*inner.applied.lock(), 0);
    }

    #[tokio::test]
    async fn test_capabilities_forward_even_while_apply_is_gated() {
        let inner = Arc::new(Counting::default());
        let layered =
            SectionFiltered::new(Arc::clone(&inner) as Arc<dyn ServerAdapter>, ["registry"]);
        assert_eq!(layered.retry_policy(), Some(RetryPolicy::sample()));
        assert!(layered.routes().is_none());
        assert_eq!(layered.name(), "layered(counting)");
    }
}
