//! Caves: named locations that resolve paths against a spelunk tree.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tracing::debug;

use cavekit_types::{CaveConfig, RenderTarget, Spelunk};
use escapement::Unsubscribe;

/// Callback observing the cave's render key.
pub type ViewKeyCallback = Box<dyn Fn(&str) + Send + Sync>;

type SharedViewKeyCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Result of resolving a path: either a node inside the tree or the
/// root configuration (the documented fallback for unroutable paths).
#[derive(Debug, Clone, Copy)]
pub enum RoutedConfig<'a> {
    Root(&'a CaveConfig),
    Node(&'a Spelunk),
}

impl<'a> RoutedConfig<'a> {
    pub fn spelunk(&self) -> &'a Spelunk {
        match self {
            RoutedConfig::Root(config) => &config.spelunk,
            RoutedConfig::Node(spelunk) => spelunk,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, RoutedConfig::Root(_))
    }
}

/// A named location owning one spelunk tree.
///
/// Resolution never fails: a path that walks off the tree lands back on
/// the root configuration. Callers that care can check
/// [`RoutedConfig::is_root`] or watch [`Cave::fallback_count`]; every
/// fallback is also logged.
pub struct Cave {
    config: CaveConfig,
    children: BTreeMap<String, Arc<Cave>>,
    initialized: AtomicBool,
    render_key_override: Mutex<Option<String>>,
    observers: Arc<Mutex<BTreeMap<u64, SharedViewKeyCallback>>>,
    next_observer: AtomicU64,
    fallback_hits: AtomicU64,
}

impl Cave {
    /// Builds the cave and, eagerly, one child cave per entry of
    /// `child_caves`. Construction performs no I/O; readiness work
    /// belongs in [`Cave::initialize`].
    pub fn new(config: CaveConfig) -> Self {
        let children = config
            .spelunk
            .child_caves
            .iter()
            .map(|(segment, spelunk)| {
                let child = CaveConfig::new(segment.clone(), spelunk.clone());
                (segment.clone(), Arc::new(Cave::new(child)))
            })
            .collect();
        Self {
            config,
            children,
            initialized: AtomicBool::new(false),
            render_key_override: Mutex::new(None),
            observers: Arc::new(Mutex::new(BTreeMap::new())),
            next_observer: AtomicU64::new(0),
            fallback_hits: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CaveConfig {
        &self.config
    }

    pub fn child(&self, segment: &str) -> Option<&Arc<Cave>> {
        self.children.get(segment)
    }

    /// Resolves `path` to a spelunk node.
    ///
    /// A leading `./` (or bare `.`) and one trailing `/` are stripped;
    /// what remains is split on `/` with empty segments discarded. The
    /// empty path and `.` address the root. The first segment with no
    /// matching child resolves to the root configuration instead.
    pub fn routed_config(&self, path: &str) -> RoutedConfig<'_> {
        let trimmed = normalize(path);
        if trimmed.is_empty() || trimmed == "." {
            return RoutedConfig::Root(&self.config);
        }
        let mut node = &self.config.spelunk;
        for segment in trimmed.split('/').filter(|s| !s.is_empty()) {
            match node.child_caves.get(segment) {
                Some(child) => node = child,
                None => {
                    self.fallback_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        cave = %self.config.name,
                        path,
                        segment,
                        "unroutable path, falling back to root"
                    );
                    return RoutedConfig::Root(&self.config);
                }
            }
        }
        RoutedConfig::Node(node)
    }

    /// Projects the resolved node into a [`RenderTarget`]. Fields the
    /// node leaves unset stay `None`.
    pub fn render_target(&self, path: &str) -> RenderTarget {
        let spelunk = self.routed_config(path).spelunk();
        RenderTarget {
            route: spelunk.route.clone(),
            container: spelunk.container.clone(),
            tomes: spelunk.tomes.clone(),
            tome_id: spelunk.tome_id.clone(),
        }
    }

    /// How many resolutions fell back to the root so far.
    pub fn fallback_count(&self) -> u64 {
        self.fallback_hits.load(Ordering::Relaxed)
    }

    /// The key a renderer should use for this cave: an explicit override
    /// wins, then the spelunk's `render_key`, then the cave name.
    pub fn render_key(&self) -> String {
        if let Some(key) = self.render_key_override.lock().clone() {
            return key;
        }
        self.config
            .spelunk
            .render_key
            .clone()
            .unwrap_or_else(|| self.config.name.clone())
    }

    /// Overrides the render key and notifies every observer.
    pub fn set_render_key(&self, key: impl Into<String>) {
        let key = key.into();
        *self.render_key_override.lock() = Some(key.clone());
        let observers: Vec<SharedViewKeyCallback> =
            self.observers.lock().values().cloned().collect();
        for cb in observers {
            cb(&key);
        }
    }

    /// Registers `cb` for render-key changes. The callback is invoked
    /// synchronously with the current key before this returns, then
    /// again on every future change until the guard is called.
    /// Registering the same closure twice yields two registrations; each
    /// guard removes exactly its own.
    pub fn observe_view_key(&self, cb: ViewKeyCallback) -> Unsubscribe {
        let cb: SharedViewKeyCallback = Arc::from(cb);
        cb(&self.render_key());
        let id = self.next_observer.fetch_add(1, Ordering::SeqCst);
        self.observers.lock().insert(id, cb);
        let observers = Arc::clone(&self.observers);
        Unsubscribe::new(move || {
            observers.lock().remove(&id);
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Awaits every child's initialization, then marks this cave
    /// initialized. Idempotent; a second call returns immediately.
    pub fn initialize(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.initialized.load(Ordering::SeqCst) {
                return;
            }
            for child in self.children.values() {
                child.initialize().await;
            }
            self.initialized.store(true, Ordering::SeqCst);
            debug!(cave = %self.config.name, "cave initialized");
        })
    }
}

fn normalize(path: &str) -> &str {
    let trimmed = path
        .strip_prefix("./")
        .or_else(|| path.strip_prefix('.'))
        .unwrap_or(path);
    trimmed.strip_suffix('/').unwrap_or(trimmed)
}
