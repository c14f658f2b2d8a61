//! Filesystem resolution plugin: maps relative and absolute specifiers to
//! files on disk via extension probing. Bare package specifiers are not its
//! business; those are rewritten to pre-bundle artifacts and resolve as
//! absolute paths on the follow-up request.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Error;
use crate::plugin::{HookResult, Plugin, PluginContext, ResolvedId};
use crate::resolver;
use crate::urls;

pub struct ResolvePlugin {
    root: PathBuf,
}

impl ResolvePlugin {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Plugin for ResolvePlugin {
    fn name(&self) -> &'static str {
        "rask:resolve"
    }

    async fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
        _ctx: &PluginContext<'_>,
    ) -> HookResult<Option<ResolvedId>> {
        if urls::is_bare_import(specifier) {
            return Ok(None);
        }
        match resolver::resolve(specifier, importer, &self.root) {
            Ok(path) => Ok(Some(ResolvedId::new(path.to_string_lossy()))),
            // A miss is a pass, not an error; the container decides what a
            // final no-match means.
            Err(Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginContainer;

    fn container(root: PathBuf) -> PluginContainer {
        PluginContainer::new(vec![Box::new(ResolvePlugin::new(root))])
    }

    #[tokio::test]
    async fn test_resolves_relative_with_extension_probe() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("App.tsx"), "export default 1;\n").unwrap();
        let importer = src.join("main.tsx");
        std::fs::write(&importer, "import App from './App';\n").unwrap();

        let container = container(dir.path().to_path_buf());
        let resolved = container
            .resolve_id("./App", Some(importer.to_str().unwrap()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.id, src.join("App.tsx").to_string_lossy());
    }

    #[tokio::test]
    async fn test_miss_is_a_soft_pass() {
        let dir = tempfile::tempdir().unwrap();
        let importer = dir.path().join("main.tsx");
        std::fs::write(&importer, "\n").unwrap();

        let container = container(dir.path().to_path_buf());
        let resolved = container
            .resolve_id("./missing", Some(importer.to_str().unwrap()))
            .await
            .unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn test_relative_without_importer_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let container = container(dir.path().to_path_buf());
        let err = container.resolve_id("./App", None).await.unwrap_err();
        assert!(matches!(err, Error::MissingImporter { .. }));
    }

    #[tokio::test]
    async fn test_bare_specifier_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let container = container(dir.path().to_path_buf());
        assert!(container.resolve_id("react", None).await.unwrap().is_none());
    }
}
