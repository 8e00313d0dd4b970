//! Request and degradation accounting.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

/// One finished request as the host adapter saw it.
#[derive(Debug, Clone, Serialize)]
pub struct RequestStats {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u64,
}

/// Sink for what the deployment should be able to answer about itself:
/// how much traffic, and whether anything silently degraded.
pub trait ResourceMonitor: Send + Sync {
    fn record_request(&self, stats: RequestStats);

    /// A subsystem swapped a configured resource for a substitute (for
    /// persistence: the memory fallback).
    fn record_fallback(&self, tome_id: &str, requested: &str, fallen_back_to: &str);

    fn request_count(&self) -> u64;

    fn fallback_count(&self) -> u64;
}

/// Counter-based monitor, the default when a deployment brings none.
#[derive(Debug, Default)]
pub struct InMemoryResourceMonitor {
    requests: AtomicU64,
    fallbacks: AtomicU64,
    by_path: Mutex<BTreeMap<String, u64>>,
}

impl InMemoryResourceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests seen per path, in path order.
    pub fn requests_by_path(&self) -> BTreeMap<String, u64> {
        self.by_path.lock().clone()
    }
}

impl ResourceMonitor for InMemoryResourceMonitor {
    fn record_request(&self, stats: RequestStats) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        *self.by_path.lock().entry(stats.path).or_insert(0) += 1;
    }

    fn record_fallback(&self, tome_id: &str, requested: &str, fallen_back_to: &str) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            tome = %tome_id,
            requested = %requested,
            substitute = %fallen_back_to,
            "resource degraded"
        );
    }

    fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_counts_requests_and_fallbacks() {
        let monitor = InMemoryResourceMonitor::new();
        monitor.record_request(RequestStats {
            method: "POST".to_string(),
            path: "/api/orders/checkout".to_string(),
            status: 200,
            duration_ms: 4,
        });
        monitor.record_request(RequestStats {
            method: "GET".to_string(),
            path: "/registry".to_string(),
            status: 200,
            duration_ms: 1,
        });
        monitor.record_fallback("orders", "duckdb", "memory");
        assert_eq!(monitor.request_count(), 2);
        assert_eq!(monitor.fallback_count(), 1);
        assert_eq!(monitor.requests_by_path().get("/registry"), Some(&1));
    }
}
