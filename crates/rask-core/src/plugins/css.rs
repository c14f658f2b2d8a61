//! Stylesheets served as JavaScript modules.
//!
//! A `.css` request never reaches the browser as raw CSS. The plugin loads
//! the file and rewrites it into a module that pushes the text into a
//! `<style>` tag through the client runtime, so the import graph and HMR
//! treat stylesheets like any other module. The wrapper accepts its own
//! updates: editing a stylesheet swaps the tag in place without reloading
//! the importer chain.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::graph::TransformResult;
use crate::hmr::CLIENT_PUBLIC_PATH;
use crate::plugin::{HookResult, LoadResult, Plugin, PluginContext, ServerContext};
use crate::urls;

pub struct CssPlugin {
    server: OnceLock<Arc<ServerContext>>,
}

impl CssPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self {
            server: OnceLock::new(),
        }
    }
}

impl Default for CssPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for CssPlugin {
    fn name(&self) -> &'static str {
        "rask:css"
    }

    async fn configure_server(&self, server: &Arc<ServerContext>) -> HookResult<()> {
        let _ = self.server.set(Arc::clone(server));
        Ok(())
    }

    async fn load(&self, id: &str, _ctx: &PluginContext<'_>) -> HookResult<Option<LoadResult>> {
        if !urls::is_css_request(id) {
            return Ok(None);
        }
        let path = Path::new(id);
        if !path.is_file() {
            return Ok(None);
        }
        let css = tokio::fs::read_to_string(path).await?;
        Ok(Some(LoadResult::code(css)))
    }

    async fn transform(
        &self,
        code: &str,
        id: &str,
        _ctx: &PluginContext<'_>,
    ) -> HookResult<Option<TransformResult>> {
        if !urls::is_css_request(id) {
            return Ok(None);
        }
        let Some(server) = self.server.get() else {
            return Ok(None);
        };

        let url = urls::file_to_url(id, &server.root);
        // The wrapper accepts itself at runtime, but boundary walks happen
        // server-side and may run before any client has connected.
        server.graph.mark_self_accepting(&url);

        Ok(Some(TransformResult {
            code: css_module(&url, code),
            map: None,
        }))
    }
}

/// JS module text for a stylesheet: inject on evaluation, swap on update,
/// drop the tag when the module is disposed.
fn css_module(url: &str, css: &str) -> String {
    let quoted_url = serde_json::Value::String(url.to_string()).to_string();
    let quoted_css = serde_json::Value::String(css.to_string()).to_string();
    format!(
        "import {{ createHotContext as __rask_createHotContext, updateStyle, removeStyle }} from \"{CLIENT_PUBLIC_PATH}\";\n\
         import.meta.hot = __rask_createHotContext({quoted_url});\n\
         const css = {quoted_css};\n\
         updateStyle({quoted_url}, css);\n\
         import.meta.hot.accept();\n\
         import.meta.hot.dispose(() => removeStyle({quoted_url}));\n\
         export default css;\n"
    )
}
