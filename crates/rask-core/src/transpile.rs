//! Syntax transpilation plugin.
//!
//! The dev server treats the compiler that lowers TSX/JSX to plain JS as an
//! opaque backend behind the [`Transpiler`] trait. Backends may need setup
//! (spawning a service process, loading a wasm blob); `prepare` runs exactly
//! once, lazily, shared by all in-flight transforms via a single
//! initialization future. A failed `prepare` is retried by the next request
//! instead of poisoning the server.
//!
//! [`TranspilePlugin`] also owns the default `load` hook for JS modules:
//! reading source files from disk so later transform hooks have text to work
//! on.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::error::Error;
use crate::graph::TransformResult;
use crate::plugin::{HookResult, LoadResult, Plugin, PluginContext};
use crate::urls;

/// An opaque syntax compiler: source text in, plain ESM out.
#[async_trait]
pub trait Transpiler: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-time setup, awaited before the first `transpile` call.
    async fn prepare(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn transpile(&self, code: &str, filename: &str) -> Result<TransformResult, Error>;
}

/// Backend that hands source through untouched, for projects already written
/// in plain ESM. Swapping in a real compiler is a matter of implementing
/// [`Transpiler`] and passing it to [`TranspilePlugin::new`].
#[derive(Debug, Default)]
pub struct PassthroughTranspiler;

#[async_trait]
impl Transpiler for PassthroughTranspiler {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    async fn transpile(&self, code: &str, _filename: &str) -> Result<TransformResult, Error> {
        Ok(TransformResult {
            code: code.to_string(),
            map: None,
        })
    }
}

/// Plugin wrapping a [`Transpiler`] backend: loads JS modules from disk and
/// runs every loaded module through the backend.
pub struct TranspilePlugin {
    backend: Arc<dyn Transpiler>,
    init: OnceCell<()>,
}

impl TranspilePlugin {
    #[must_use]
    pub fn new(backend: Arc<dyn Transpiler>) -> Self {
        Self {
            backend,
            init: OnceCell::new(),
        }
    }

    /// Await the backend's one-time setup. Concurrent callers share one
    /// initialization future; an error leaves the cell unset so the next
    /// call retries.
    async fn ensure_ready(&self) -> Result<(), Error> {
        self.init
            .get_or_try_init(|| self.backend.prepare())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Plugin for TranspilePlugin {
    fn name(&self) -> &'static str {
        "rask:transpile"
    }

    async fn load(&self, id: &str, _ctx: &PluginContext<'_>) -> HookResult<Option<LoadResult>> {
        if !urls::is_js_request(id) {
            return Ok(None);
        }
        let path = Path::new(id);
        if !path.is_file() {
            return Ok(None);
        }
        let code = tokio::fs::read_to_string(path).await?;
        Ok(Some(LoadResult::code(code)))
    }

    async fn transform(
        &self,
        code: &str,
        id: &str,
        _ctx: &PluginContext<'_>,
    ) -> HookResult<Option<TransformResult>> {
        if !urls::is_js_request(id) {
            return Ok(None);
        }
        self.ensure_ready().await?;
        let result = self.backend.transpile(code, id).await?;
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginContainer;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn container_with(backend: Arc<dyn Transpiler>) -> PluginContainer {
        PluginContainer::new(vec![Box::new(TranspilePlugin::new(backend))])
    }

    #[tokio::test]
    async fn test_passthrough_leaves_code_unchanged() {
        let container = container_with(Arc::new(PassthroughTranspiler));
        let result = container
            .transform("const x = 1;".to_string(), "/proj/src/a.ts")
            .await
            .unwrap();
        assert_eq!(result.code, "const x = 1;");
        assert_eq!(result.map, None);
    }

    #[tokio::test]
    async fn test_non_js_ids_pass_through_untouched() {
        struct ShoutingTranspiler;

        #[async_trait]
        impl Transpiler for ShoutingTranspiler {
            fn name(&self) -> &'static str {
                "shouting"
            }

            async fn transpile(&self, code: &str, _f: &str) -> Result<TransformResult, Error> {
                Ok(TransformResult {
                    code: code.to_uppercase(),
                    map: None,
                })
            }
        }

        let container = container_with(Arc::new(ShoutingTranspiler));
        let css = container
            .transform("body {}".to_string(), "/proj/src/a.css")
            .await
            .unwrap();
        assert_eq!(css.code, "body {}");

        let js = container
            .transform("body".to_string(), "/proj/src/a.js")
            .await
            .unwrap();
        assert_eq!(js.code, "BODY");
    }

    #[tokio::test]
    async fn test_prepare_runs_once_across_transforms() {
        struct CountingTranspiler {
            prepares: AtomicUsize,
        }

        #[async_trait]
        impl Transpiler for CountingTranspiler {
            fn name(&self) -> &'static str {
                "counting"
            }

            async fn prepare(&self) -> Result<(), Error> {
                self.prepares.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }

            async fn transpile(&self, code: &str, _f: &str) -> Result<TransformResult, Error> {
                Ok(TransformResult {
                    code: code.to_string(),
                    map: None,
                })
            }
        }

        let backend = Arc::new(CountingTranspiler {
            prepares: AtomicUsize::new(0),
        });
        let container = container_with(Arc::clone(&backend) as Arc<dyn Transpiler>);

        for _ in 0..3 {
            container
                .transform("x".to_string(), "/proj/src/a.js")
                .await
                .unwrap();
        }
        assert_eq!(backend.prepares.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_prepare_is_retried() {
        struct FlakyTranspiler {
            failed_once: AtomicBool,
        }

        #[async_trait]
        impl Transpiler for FlakyTranspiler {
            fn name(&self) -> &'static str {
                "flaky"
            }

            async fn prepare(&self) -> Result<(), Error> {
                if self.failed_once.swap(true, Ordering::SeqCst) {
                    Ok(())
                } else {
                    Err(Error::other("setup failed"))
                }
            }

            async fn transpile(&self, code: &str, _f: &str) -> Result<TransformResult, Error> {
                Ok(TransformResult {
                    code: code.to_string(),
                    map: None,
                })
            }
        }

        let container = container_with(Arc::new(FlakyTranspiler {
            failed_once: AtomicBool::new(false),
        }));

        assert!(container
            .transform("x".to_string(), "/proj/src/a.js")
            .await
            .is_err());
        assert!(container
            .transform("x".to_string(), "/proj/src/a.js")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_load_reads_js_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.js");
        std::fs::write(&file, "export const n = 1;\n").unwrap();

        let container = container_with(Arc::new(PassthroughTranspiler));
        let loaded = container
            .load(file.to_str().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.code, "export const n = 1;\n");
    }

    #[tokio::test]
    async fn test_load_passes_on_missing_or_non_js() {
        let dir = tempfile::tempdir().unwrap();
        let css = dir.path().join("style.css");
        std::fs::write(&css, "body {}\n").unwrap();

        let container = container_with(Arc::new(PassthroughTranspiler));
        assert!(container
            .load(dir.path().join("missing.js").to_str().unwrap())
            .await
            .unwrap()
            .is_none());
        assert!(container
            .load(css.to_str().unwrap())
            .await
            .unwrap()
            .is_none());
    }
}
