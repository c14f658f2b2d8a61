//! Module graph.
//!
//! Tracks every module the server has seen this session: its browser-facing
//! URL, its resolved file id, forward/back import edges, the cached transform
//! result, and the invalidation timestamp that drives cache busting.
//!
//! Nodes live in one owned map keyed by URL, with a second index from file id
//! back to URL; edges are sets of URL keys, so cyclic imports are
//! representable without ownership hazards. Every mutation happens inside a
//! single lock block with no suspension point, which keeps concurrent
//! requests from observing a half-updated edge set.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock};

use futures::future::BoxFuture;

use crate::error::Error;

/// Maps a module URL to its resolved file id, asynchronously. Injected so the
/// graph never depends on the plugin container directly.
pub type UrlResolver = Box<dyn Fn(String) -> BoxFuture<'static, Option<String>> + Send + Sync>;

/// Output of a completed transform pipeline, cached per module until the
/// module is invalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult {
    pub code: String,
    /// Serialized source map, when a transform produced one.
    pub map: Option<String>,
}

/// One module known to the server.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    /// Browser-facing request path (e.g. `/src/App.tsx`), unique in the graph.
    pub url: String,
    /// Resolved absolute file path, or a synthetic id for virtual modules.
    /// Stable once set.
    pub id: Option<String>,
    /// URLs of modules that import this one (back-edges).
    pub importers: HashSet<String>,
    /// URLs this module imports (forward-edges).
    pub imported_modules: HashSet<String>,
    /// Whether the module registered `import.meta.hot.accept()` for itself.
    pub is_self_accepting: bool,
    /// Cached output of the last successful transform.
    pub transform_result: Option<TransformResult>,
    /// Monotonically increasing; zero until the first invalidation.
    pub last_hmr_timestamp: u64,
}

impl ModuleNode {
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            id: None,
            importers: HashSet::new(),
            imported_modules: HashSet::new(),
            is_self_accepting: false,
            transform_result: None,
            last_hmr_timestamp: 0,
        }
    }
}

struct GraphInner {
    url_to_module: HashMap<String, ModuleNode>,
    id_to_url: HashMap<String, String>,
}

/// The module graph. Shared across requests behind an `Arc`; interior
/// locking keeps each operation atomic.
pub struct ModuleGraph {
    inner: RwLock<GraphInner>,
    resolver: OnceLock<UrlResolver>,
    clock: LogicalClock,
}

impl ModuleGraph {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(GraphInner {
                url_to_module: HashMap::new(),
                id_to_url: HashMap::new(),
            }),
            resolver: OnceLock::new(),
            clock: LogicalClock::default(),
        }
    }

    /// Install the URL resolver. Later calls are ignored; the first resolver
    /// wins for the life of the graph.
    pub fn set_resolver(&self, resolver: UrlResolver) {
        let _ = self.resolver.set(resolver);
    }

    /// Look up a module by URL. Returns a snapshot, not a live reference.
    #[must_use]
    pub fn module_by_url(&self, url: &str) -> Option<ModuleNode> {
        self.inner.read().unwrap().url_to_module.get(url).cloned()
    }

    /// Look up a module by resolved file id.
    #[must_use]
    pub fn module_by_id(&self, id: &str) -> Option<ModuleNode> {
        let inner = self.inner.read().unwrap();
        let url = inner.id_to_url.get(id)?;
        inner.url_to_module.get(url).cloned()
    }

    /// URL registered for a file path, if the file backs a known module. Used
    /// by the watcher to translate change events.
    #[must_use]
    pub fn url_for_file(&self, file: &str) -> Option<String> {
        self.inner.read().unwrap().id_to_url.get(file).cloned()
    }

    /// Get or create the module for `url`, resolving its file id through the
    /// injected resolver on first sight. Resolution happens outside the lock;
    /// a concurrent request creating the same module first wins.
    pub async fn ensure_module(&self, url: &str) -> ModuleNode {
        if let Some(found) = self.module_by_url(url) {
            return found;
        }
        let resolved = match self.resolver.get() {
            Some(resolve) => resolve(url.to_string()).await,
            None => None,
        };
        self.ensure_entry(url, resolved.as_deref())
    }

    /// Synchronous variant of [`Self::ensure_module`] for callers that
    /// already know the resolved id (or know there is none). Fills in a
    /// missing id on an existing node but never overwrites one.
    pub fn ensure_entry(&self, url: &str, id: Option<&str>) -> ModuleNode {
        let mut guard = self.inner.write().unwrap();
        let GraphInner {
            url_to_module,
            id_to_url,
        } = &mut *guard;

        if let Some(existing) = url_to_module.get_mut(url) {
            if existing.id.is_none() {
                if let Some(id) = id {
                    existing.id = Some(id.to_string());
                    id_to_url.insert(id.to_string(), url.to_string());
                }
            }
            return existing.clone();
        }

        let mut node = ModuleNode::new(url);
        if let Some(id) = id {
            node.id = Some(id.to_string());
            id_to_url.insert(id.to_string(), url.to_string());
        }
        url_to_module.insert(url.to_string(), node.clone());
        node
    }

    /// Replace the forward-edge set of `url` with `imported`, diffing against
    /// the previous set: back-edges are removed from targets no longer
    /// imported and added to the new ones. Runs in O(|old| + |new|) inside
    /// one lock block.
    pub fn update_module_info(&self, url: &str, imported: &[String]) {
        let new_set: HashSet<String> = imported.iter().cloned().collect();
        let mut guard = self.inner.write().unwrap();
        let modules = &mut guard.url_to_module;

        let old_set = match modules.get(url) {
            Some(module) => module.imported_modules.clone(),
            None => {
                modules.insert(url.to_string(), ModuleNode::new(url));
                HashSet::new()
            }
        };

        for removed in old_set.difference(&new_set) {
            if let Some(target) = modules.get_mut(removed) {
                target.importers.remove(url);
            }
        }
        for added in new_set.difference(&old_set) {
            let target = modules
                .entry(added.clone())
                .or_insert_with(|| ModuleNode::new(added));
            target.importers.insert(url.to_string());
        }
        if let Some(module) = modules.get_mut(url) {
            module.imported_modules = new_set;
        }
    }

    /// Mark a module as self-accepting. Invalidation and boundary walks stop
    /// here instead of propagating to its importers.
    pub fn mark_self_accepting(&self, url: &str) {
        if let Some(module) = self.inner.write().unwrap().url_to_module.get_mut(url) {
            module.is_self_accepting = true;
        }
    }

    /// Cached transform output for `url`, if still valid.
    #[must_use]
    pub fn cached_transform(&self, url: &str) -> Option<TransformResult> {
        self.inner
            .read()
            .unwrap()
            .url_to_module
            .get(url)
            .and_then(|m| m.transform_result.clone())
    }

    /// Cache a transform result, but only if the module's invalidation
    /// timestamp still equals `seen_timestamp` (the value observed when the
    /// transform started). A transform that raced with an invalidation gets
    /// its result dropped and recomputed on the next request. Returns whether
    /// the result was stored.
    pub fn cache_transform_result(
        &self,
        url: &str,
        result: TransformResult,
        seen_timestamp: u64,
    ) -> bool {
        let mut guard = self.inner.write().unwrap();
        match guard.url_to_module.get_mut(url) {
            Some(module) if module.last_hmr_timestamp == seen_timestamp => {
                module.transform_result = Some(result);
                true
            }
            _ => false,
        }
    }

    /// Invalidate `url` and walk up its importer chain: every reached module
    /// loses its cached transform and gets the same fresh timestamp. A
    /// self-accepting importer is itself invalidated (its next rewrite must
    /// embed the new cache-buster) but the walk does not continue past it.
    /// Cycles terminate via the visited set.
    ///
    /// Returns the timestamp applied, or `None` if the URL is unknown.
    pub fn invalidate(&self, url: &str) -> Option<u64> {
        let mut guard = self.inner.write().unwrap();
        if !guard.url_to_module.contains_key(url) {
            return None;
        }
        let stamp = self.clock.tick();
        let modules = &mut guard.url_to_module;

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue = vec![url.to_string()];
        while let Some(current) = queue.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let (importers, accepting) = match modules.get_mut(&current) {
                Some(node) => {
                    node.transform_result = None;
                    node.last_hmr_timestamp = stamp;
                    (
                        node.importers.iter().cloned().collect::<Vec<_>>(),
                        node.is_self_accepting,
                    )
                }
                None => continue,
            };
            if accepting && current != url {
                continue;
            }
            queue.extend(importers);
        }
        Some(stamp)
    }

    /// Find the HMR boundaries for a changed module: the nearest
    /// self-accepting module on every importer chain. Any chain that reaches
    /// a root without finding one forces a full reload.
    #[must_use]
    pub fn hmr_boundaries(&self, url: &str) -> BoundaryWalk {
        let guard = self.inner.read().unwrap();
        let modules = &guard.url_to_module;

        let Some(module) = modules.get(url) else {
            return BoundaryWalk::FullReload;
        };
        if module.is_self_accepting {
            return BoundaryWalk::Updates(vec![HmrBoundary {
                boundary_url: url.to_string(),
                accepted_url: url.to_string(),
            }]);
        }

        let mut updates = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: Vec<String> = module.importers.iter().cloned().collect();
        if queue.is_empty() {
            return BoundaryWalk::FullReload;
        }
        while let Some(importer_url) = queue.pop() {
            if !visited.insert(importer_url.clone()) {
                continue;
            }
            match modules.get(&importer_url) {
                Some(importer) if importer.is_self_accepting => {
                    updates.push(HmrBoundary {
                        boundary_url: importer_url.clone(),
                        accepted_url: importer_url,
                    });
                }
                Some(importer) if importer.importers.is_empty() => {
                    return BoundaryWalk::FullReload;
                }
                Some(importer) => queue.extend(importer.importers.iter().cloned()),
                None => return BoundaryWalk::FullReload,
            }
        }
        if updates.is_empty() {
            BoundaryWalk::FullReload
        } else {
            BoundaryWalk::Updates(updates)
        }
    }

    /// Verify the reciprocal-edge invariant across the whole graph. An
    /// asymmetric edge is a defect in edge bookkeeping, not a recoverable
    /// condition.
    pub fn check_edges(&self) -> Result<(), Error> {
        let guard = self.inner.read().unwrap();
        for (url, module) in &guard.url_to_module {
            for target in &module.imported_modules {
                let has_back_edge = guard
                    .url_to_module
                    .get(target)
                    .is_some_and(|t| t.importers.contains(url));
                if !has_back_edge {
                    return Err(Error::GraphConsistency(format!(
                        "module {url} imports {target} but {target} has no back-edge"
                    )));
                }
            }
            for importer in &module.importers {
                let has_forward_edge = guard
                    .url_to_module
                    .get(importer)
                    .is_some_and(|i| i.imported_modules.contains(url));
                if !has_forward_edge {
                    return Err(Error::GraphConsistency(format!(
                        "module {url} lists importer {importer} but {importer} has no forward edge"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for ModuleGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of an HMR boundary walk for one changed module.
#[derive(Debug, PartialEq, Eq)]
pub enum BoundaryWalk {
    /// Each boundary re-imports itself; the client applies these in order.
    Updates(Vec<HmrBoundary>),
    /// No boundary on some importer chain; the page has to reload.
    FullReload,
}

/// A self-accepting module that absorbs an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HmrBoundary {
    pub boundary_url: String,
    pub accepted_url: String,
}

/// Wall-clock milliseconds forced strictly increasing, so two invalidations
/// in the same millisecond still produce distinct cache-buster queries.
#[derive(Debug, Default)]
struct LogicalClock {
    last: AtomicU64,
}

impl LogicalClock {
    fn tick(&self) -> u64 {
        let now = now_ms();
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(0);
        now.max(prev + 1)
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
