//! Built-in plugins and the default server stack.

pub mod asset;
pub mod css;
pub mod resolve;

use std::path::PathBuf;
use std::sync::Arc;

use crate::plugin::Plugin;
use crate::rewrite::ImportRewritePlugin;
use crate::transpile::{PassthroughTranspiler, TranspilePlugin, Transpiler};

/// The default plugin stack with no source-level transpilation.
#[must_use]
pub fn default_plugins(root: impl Into<PathBuf>) -> Vec<Box<dyn Plugin>> {
    with_transpiler(root, Arc::new(PassthroughTranspiler))
}

/// The default plugin stack around a specific transpiler backend.
///
/// Order matters: resolution answers first, the transpiler runs before the
/// import rewrite so the rewrite scans its output, and the stylesheet and
/// asset emitters sit last because they answer whole-file requests nothing
/// earlier claims.
#[must_use]
pub fn with_transpiler(
    root: impl Into<PathBuf>,
    backend: Arc<dyn Transpiler>,
) -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(resolve::ResolvePlugin::new(root.into())),
        Box::new(TranspilePlugin::new(backend)),
        Box::new(ImportRewritePlugin::new()),
        Box::new(css::CssPlugin::new()),
        Box::new(asset::AssetPlugin::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginContainer;

    #[test]
    fn test_default_stack_order() {
        let container = PluginContainer::new(default_plugins("/proj"));
        assert_eq!(
            container.plugin_names(),
            vec![
                "rask:resolve",
                "rask:transpile",
                "rask:import-rewrite",
                "rask:css",
                "rask:asset",
            ]
        );
    }
}
