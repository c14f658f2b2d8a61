//! Static assets imported from JavaScript.
//!
//! When a module imports an image or font, the browser needs a URL, not the
//! file bytes. The plugin answers `load` for asset ids with a tiny module
//! whose default export is the asset's served URL. The bytes themselves go
//! out through the static file route when the browser requests that URL.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::plugin::{HookResult, LoadResult, Plugin, PluginContext, ServerContext};
use crate::urls;

pub struct AssetPlugin {
    server: OnceLock<Arc<ServerContext>>,
}

impl AssetPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self {
            server: OnceLock::new(),
        }
    }
}

impl Default for AssetPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for AssetPlugin {
    fn name(&self) -> &'static str {
        "rask:asset"
    }

    async fn configure_server(&self, server: &Arc<ServerContext>) -> HookResult<()> {
        let _ = self.server.set(Arc::clone(server));
        Ok(())
    }

    async fn load(&self, id: &str, _ctx: &PluginContext<'_>) -> HookResult<Option<LoadResult>> {
        if !urls::is_asset_request(id) {
            return Ok(None);
        }
        let Some(server) = self.server.get() else {
            return Ok(None);
        };

        let url = urls::file_to_url(urls::remove_import_query(id), &server.root);
        let quoted = serde_json::Value::String(url).to_string();
        Ok(Some(LoadResult::code(format!("export default {quoted};\n"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ModuleGraph;
    use crate::hmr::HmrSender;
    use crate::plugin::PluginContainer;

    async fn asset_fixture(root: &std::path::Path) -> PluginContainer {
        let server = Arc::new(ServerContext {
            root: root.to_path_buf(),
            graph: Arc::new(ModuleGraph::new()),
            hmr: HmrSender::default(),
        });
        let container = PluginContainer::new(vec![Box::new(AssetPlugin::new())]);
        container.configure_server(&server).await.unwrap();
        container
    }

    #[tokio::test]
    async fn test_asset_load_exports_url() {
        let container = asset_fixture(std::path::Path::new("/proj")).await;

        let loaded = container.load("/proj/src/logo.svg").await.unwrap();
        let loaded = match loaded {
            Some(result) => result,
            None => panic!("asset id should load"),
        };
        assert_eq!(loaded.code, "export default \"/src/logo.svg\";\n");
    }

    #[tokio::test]
    async fn test_asset_load_strips_import_marker() {
        let container = asset_fixture(std::path::Path::new("/proj")).await;

        let loaded = container.load("/proj/img/a.png?import").await.unwrap();
        let loaded = match loaded {
            Some(result) => result,
            None => panic!("asset id should load"),
        };
        assert_eq!(loaded.code, "export default \"/img/a.png\";\n");
    }

    #[tokio::test]
    async fn test_non_asset_ids_pass_through() {
        let container = asset_fixture(std::path::Path::new("/proj")).await;
        assert!(container.load("/proj/src/main.tsx").await.unwrap().is_none());
        assert!(container.load("/proj/src/app.css").await.unwrap().is_none());
    }
}
