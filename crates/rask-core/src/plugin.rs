//! Plugin container.
//!
//! A plugin is a named bundle of optional hooks; every hook has a default
//! no-op so implementations only write the ones they care about. The
//! container runs a hook across all plugins in registration order with the
//! hook's short-circuit semantics: `resolve_id` and `load` stop at the first
//! plugin that answers, `transform` chains every plugin's output into the
//! next, and `configure_server` runs once per plugin at startup.
//!
//! Each `resolve_id`/`load`/`transform` invocation receives a
//! [`PluginContext`] bound to that call, whose `resolve` method re-enters the
//! container's own `resolve_id` so hooks resolve specifiers with the same
//! plugin ordering instead of duplicating resolution logic.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::graph::{ModuleGraph, TransformResult};
use crate::hmr::HmrSender;

/// Result type for plugin hooks.
pub type HookResult<T> = Result<T, Error>;

/// Successful `resolve_id` answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedId {
    /// Resolved module id, usually an absolute file path.
    pub id: String,
}

impl ResolvedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Successful `load` answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    /// Module source text.
    pub code: String,
    /// Optional source map.
    pub map: Option<String>,
}

impl LoadResult {
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            map: None,
        }
    }
}

/// Shared server state handed to every plugin's `configure_server` hook.
/// Created once at startup; plugins that need it across later hook
/// invocations keep their own `Arc` clone.
pub struct ServerContext {
    /// Absolute project root.
    pub root: PathBuf,
    /// The module graph for this server session.
    pub graph: Arc<ModuleGraph>,
    /// Push channel to connected HMR clients.
    pub hmr: HmrSender,
}

/// Per-call resolution context. Carries the container and the importer the
/// current hook runs on behalf of.
pub struct PluginContext<'a> {
    container: &'a PluginContainer,
    /// Module id the current hook is processing, if any.
    pub importer: Option<&'a str>,
}

impl PluginContext<'_> {
    /// Resolve a specifier through the whole container, with the same plugin
    /// ordering as a top-level `resolve_id` call. An explicit `importer`
    /// overrides the context's own.
    pub async fn resolve(
        &self,
        specifier: &str,
        importer: Option<&str>,
    ) -> HookResult<Option<ResolvedId>> {
        self.container
            .resolve_id(specifier, importer.or(self.importer))
            .await
    }
}

/// The hook surface. All hooks are optional; absent hooks behave as no-ops.
/// Hooks must be idempotent: none is guaranteed to run at most once.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name for logging and error messages.
    fn name(&self) -> &'static str;

    /// Called once per plugin at server startup, in registration order.
    async fn configure_server(&self, _server: &Arc<ServerContext>) -> HookResult<()> {
        Ok(())
    }

    /// Map a specifier to a module id. Return `None` to pass to the next
    /// plugin; returning an error aborts the request.
    async fn resolve_id(
        &self,
        _specifier: &str,
        _importer: Option<&str>,
        _ctx: &PluginContext<'_>,
    ) -> HookResult<Option<ResolvedId>> {
        Ok(None)
    }

    /// Produce source text for a module id. Return `None` to pass.
    async fn load(&self, _id: &str, _ctx: &PluginContext<'_>) -> HookResult<Option<LoadResult>> {
        Ok(None)
    }

    /// Rewrite source text. Return `None` to leave the code unchanged for
    /// the next plugin in the chain.
    async fn transform(
        &self,
        _code: &str,
        _id: &str,
        _ctx: &PluginContext<'_>,
    ) -> HookResult<Option<TransformResult>> {
        Ok(None)
    }
}

/// Runs hooks across an ordered plugin list.
pub struct PluginContainer {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginContainer {
    #[must_use]
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    /// Registered plugin names, in hook execution order.
    #[must_use]
    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Run `configure_server` on every plugin, in order.
    pub async fn configure_server(&self, server: &Arc<ServerContext>) -> Result<(), Error> {
        for plugin in &self.plugins {
            plugin.configure_server(server).await?;
        }
        Ok(())
    }

    /// First-match-wins resolution. `Ok(None)` means no plugin resolved the
    /// specifier, which callers treat as soft or hard depending on context.
    pub async fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
    ) -> Result<Option<ResolvedId>, Error> {
        let ctx = PluginContext {
            container: self,
            importer,
        };
        for plugin in &self.plugins {
            if let Some(resolved) = plugin.resolve_id(specifier, importer, &ctx).await? {
                return Ok(Some(resolved));
            }
        }
        Ok(None)
    }

    /// First-match-wins load.
    pub async fn load(&self, id: &str) -> Result<Option<LoadResult>, Error> {
        let ctx = PluginContext {
            container: self,
            importer: Some(id),
        };
        for plugin in &self.plugins {
            if let Some(loaded) = plugin.load(id, &ctx).await? {
                return Ok(Some(loaded));
            }
        }
        Ok(None)
    }

    /// Chained transform: each plugin receives the previous plugin's output.
    /// A later plugin's source map replaces an earlier one; map propagation
    /// across the chain is best-effort.
    pub async fn transform(&self, code: String, id: &str) -> Result<TransformResult, Error> {
        let ctx = PluginContext {
            container: self,
            importer: Some(id),
        };
        let mut current = TransformResult { code, map: None };
        for plugin in &self.plugins {
            if let Some(result) = plugin.transform(&current.code, id, &ctx).await? {
                current = result;
            }
        }
        Ok(current)
    }
}
