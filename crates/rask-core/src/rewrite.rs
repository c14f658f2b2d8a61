//! Import-rewrite transform.
//!
//! The last transform in the chain: takes post-transpilation ESM source,
//! rewrites every static import specifier into a URL the browser can request
//! back, and records the module's forward edges in the graph. Specifier
//! classes, in check order:
//!
//! - asset (`./logo.svg`): joined onto the importing module's directory with
//!   an `?import` marker, no existence check, no graph edge
//! - bare (`react`): fixed path under the pre-bundle output directory plus a
//!   `.js` suffix, trusted to exist, edge recorded
//! - relative/absolute: resolved through the plugin container; the resolved
//!   path becomes a root-relative URL, cache-busted with `?t=` once the
//!   target has been invalidated, edge recorded. An unresolvable specifier
//!   is left untouched and surfaces later as a browser-side 404.
//!
//! Rewrites are span-based overwrites against the original buffer, and every
//! result carries a source map generated from the same spans. The HMR
//! bootstrap is prepended to every application module; dependency modules
//! under `node_modules` are immutable for the session and get none.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use string_wizard::{Hires, MagicString, SourceMapOptions};

use crate::graph::TransformResult;
use crate::hmr;
use crate::plugin::{HookResult, Plugin, PluginContext, ServerContext};
use crate::prebundle::PRE_BUNDLE_DIR;
use crate::scan;
use crate::urls;

pub struct ImportRewritePlugin {
    server: OnceLock<Arc<ServerContext>>,
}

impl ImportRewritePlugin {
    #[must_use]
    pub fn new() -> Self {
        Self {
            server: OnceLock::new(),
        }
    }
}

impl Default for ImportRewritePlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for ImportRewritePlugin {
    fn name(&self) -> &'static str {
        "rask:import-rewrite"
    }

    async fn configure_server(&self, server: &Arc<ServerContext>) -> HookResult<()> {
        let _ = self.server.set(Arc::clone(server));
        Ok(())
    }

    async fn transform(
        &self,
        code: &str,
        id: &str,
        ctx: &PluginContext<'_>,
    ) -> HookResult<Option<TransformResult>> {
        let Some(server) = self.server.get() else {
            return Ok(None);
        };
        if !urls::is_js_request(id) {
            return Ok(None);
        }
        let url = module_url(server, id);
        if urls::is_internal_request(&url) {
            return Ok(None);
        }

        let root = &server.root;
        let dir = Path::new(id)
            .parent()
            .map_or_else(|| "/".to_string(), |p| p.to_string_lossy().into_owned());

        // Classify every scanned specifier and resolve replacements first;
        // graph writes wait for the synchronous block below.
        let mut edits: Vec<(usize, usize, String)> = Vec::new();
        let mut edges: Vec<String> = Vec::new();
        let mut known_ids: Vec<(String, String)> = Vec::new();

        for span in scan::scan_imports(code) {
            let spec = span.specifier.as_str();
            if spec.is_empty() {
                continue;
            }

            if urls::is_asset_request(spec) {
                // Isolated leaf: the asset loader answers the follow-up
                // request, the graph never sees it
                let joined = urls::normalize_path(&format!("{dir}/{spec}"));
                edits.push((span.start, span.end, format!("{joined}?import")));
                continue;
            }

            if urls::is_bare_import(spec) {
                let target = format!("{}/{PRE_BUNDLE_DIR}/{spec}.js", root.display());
                edits.push((span.start, span.end, target.clone()));
                edges.push(target);
                continue;
            }

            match ctx.resolve(spec, Some(id)).await? {
                Some(resolved) => {
                    let target_url = urls::file_to_url(&resolved.id, root);
                    let stamped = match server.graph.module_by_id(&resolved.id) {
                        Some(node) if node.last_hmr_timestamp > 0 => {
                            format!("{target_url}?t={}", node.last_hmr_timestamp)
                        }
                        _ => target_url.clone(),
                    };
                    edits.push((span.start, span.end, stamped));
                    known_ids.push((target_url.clone(), resolved.id));
                    edges.push(target_url);
                }
                None => {}
            }
        }

        // Apply the edits and swap the edge set, no suspension points.
        let mut magic = MagicString::new(code);
        for (start, end, text) in edits {
            magic.update(start, end, text);
        }
        let clean_url = urls::clean_url(&url).to_string();
        if !id.contains("node_modules") {
            magic.prepend(hmr::hot_context_preamble(&clean_url));
        }

        for (target_url, target_id) in &known_ids {
            server.graph.ensure_entry(target_url, Some(target_id));
        }
        server.graph.update_module_info(&clean_url, &edges);
        if detects_self_accept(code) {
            server.graph.mark_self_accepting(&clean_url);
        }

        // Map against the pre-rewrite buffer, original content embedded.
        let map = magic
            .source_map(SourceMapOptions {
                include_content: true,
                source: clean_url.as_str().into(),
                hires: Hires::Boundary,
            })
            .to_json_string();

        Ok(Some(TransformResult {
            code: magic.to_string(),
            map: Some(map),
        }))
    }
}

/// Browser-facing URL for a module id: the graph's registration when the
/// module has one, otherwise root-relative derivation.
fn module_url(server: &ServerContext, id: &str) -> String {
    server
        .graph
        .module_by_id(id)
        .map_or_else(|| urls::file_to_url(id, &server.root), |node| node.url)
}

/// Serve-time hint for HMR acceptance. The authoritative signal is the
/// client's `hotAccept` message once the module executes; this scan marks
/// the boundary before the browser even connects. A first argument that is
/// a string or array literal accepts dep updates, not the module itself.
fn detects_self_accept(code: &str) -> bool {
    for line in code.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("//") || trimmed.starts_with('*') || trimmed.starts_with("/*") {
            continue;
        }
        for pattern in [".hot.accept(", ".hot?.accept("] {
            if let Some(idx) = trimmed.find(pattern) {
                let arg = trimmed[idx + pattern.len()..].trim_start();
                if !(arg.starts_with('\'') || arg.starts_with('"') || arg.starts_with('[')) {
                    return true;
                }
            }
        }
    }
    false
}
