//! The per-request transform pipeline and its file-change counterpart.
//!
//! A browser request for a module URL flows through here: graph cache check,
//! URL-to-id resolution, plugin `load`, plugin `transform`, then the result
//! is cached on the module node. A watcher event flows the other way:
//! invalidate the node for the changed file, walk to the HMR boundaries, and
//! broadcast the outcome to connected clients.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Error;
use crate::graph::{BoundaryWalk, ModuleGraph, TransformResult};
use crate::hmr::{self, ServerMessage};
use crate::plugin::{Plugin, PluginContainer, ServerContext};
use crate::urls::clean_url;

/// Shared server core: plugin container, module graph, HMR sender, wired
/// together once at startup.
pub struct RequestPipeline {
    container: Arc<PluginContainer>,
    server: Arc<ServerContext>,
}

impl RequestPipeline {
    /// Build the container and graph, point the graph's URL resolver at the
    /// container, and run every plugin's `configure_server` in order.
    ///
    /// The resolver closure holds a weak handle; the graph never keeps the
    /// container alive on its own.
    ///
    /// # Errors
    /// Propagates the first `configure_server` failure.
    pub async fn new(root: PathBuf, plugins: Vec<Box<dyn Plugin>>) -> Result<Self, Error> {
        let graph = Arc::new(ModuleGraph::new());
        let container = Arc::new(PluginContainer::new(plugins));

        let weak = Arc::downgrade(&container);
        graph.set_resolver(Box::new(move |url| {
            let weak = weak.clone();
            Box::pin(async move {
                let container = weak.upgrade()?;
                container
                    .resolve_id(&url, None)
                    .await
                    .ok()
                    .flatten()
                    .map(|resolved| resolved.id)
            })
        }));

        let server = Arc::new(ServerContext {
            root,
            graph,
            hmr: hmr::HmrSender::default(),
        });
        container.configure_server(&server).await?;

        Ok(Self { container, server })
    }

    #[must_use]
    pub fn server(&self) -> &Arc<ServerContext> {
        &self.server
    }

    #[must_use]
    pub fn container(&self) -> &Arc<PluginContainer> {
        &self.container
    }

    #[must_use]
    pub fn graph(&self) -> &Arc<ModuleGraph> {
        &self.server.graph
    }

    /// Serve one module request: cached result if the node has one,
    /// otherwise load, transform, and cache.
    ///
    /// The node's HMR timestamp is captured before the plugins run; if the
    /// file is invalidated mid-flight, the stale result is returned to the
    /// requester that started it but never cached.
    ///
    /// # Errors
    /// `NotFound` when no plugin can load the module; any hook error aborts
    /// the request.
    pub async fn transform_request(&self, raw_url: &str) -> Result<TransformResult, Error> {
        let url = clean_url(raw_url).to_string();

        if let Some(cached) = self.server.graph.cached_transform(&url) {
            return Ok(cached);
        }

        let node = self.server.graph.ensure_module(&url).await;
        let seen_timestamp = node.last_hmr_timestamp;
        let id = node.id.unwrap_or_else(|| url.clone());

        let loaded = self
            .container
            .load(&id)
            .await?
            .ok_or_else(|| Error::not_found(&url))?;
        let result = self.container.transform(loaded.code, &id).await?;

        self.server
            .graph
            .cache_transform_result(&url, result.clone(), seen_timestamp);
        Ok(result)
    }

    /// React to a changed file: invalidate its module, decide between a
    /// targeted update and a full reload, and broadcast to HMR clients.
    ///
    /// Returns the broadcast message, or `None` when the file maps to no
    /// known module.
    pub async fn on_file_change(&self, file: &str) -> Option<ServerMessage> {
        let url = self.server.graph.url_for_file(file)?;
        let timestamp = self.server.graph.invalidate(&url)?;

        let message = match self.server.graph.hmr_boundaries(&url) {
            BoundaryWalk::Updates(boundaries) => hmr::update_message(&boundaries, timestamp),
            BoundaryWalk::FullReload => ServerMessage::FullReload,
        };
        self.server.hmr.send(message.clone());
        Some(message)
    }
}
