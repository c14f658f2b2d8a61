//! Dependency pre-bundling for dev serving.
//!
//! Bare imports are rewritten to fixed paths under [`PRE_BUNDLE_DIR`], so
//! before the server accepts requests something has to populate that
//! directory. The pre-bundler walks the static import graph from the project
//! entry, collects bare specifiers, and writes one flat ES-module artifact
//! per specifier: a re-export shim when the package ships ESM, a CommonJS
//! interop wrapper otherwise. Artifacts are timestamp-free and regenerated
//! only at startup, which is what lets the server hand them out with
//! immutable cache headers.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;
use crate::resolver;
use crate::scan::scan_imports;
use crate::urls;

/// Output directory for pre-bundled dependencies, relative to the project
/// root. The import rewrite points bare specifiers here without checking.
pub const PRE_BUNDLE_DIR: &str = "node_modules/.rask/deps";

/// One artifact written to the deps directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreBundledDep {
    /// Bare specifier as it appears in source (`react`, `@scope/pkg/sub`).
    pub specifier: String,
    /// Absolute path of the written artifact.
    pub output_path: PathBuf,
}

/// A specifier the pre-bundler gave up on, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDep {
    pub specifier: String,
    pub reason: String,
}

/// Outcome of a pre-bundle run. Individual package failures do not abort the
/// run; the caller decides how loudly to report them.
#[derive(Debug, Default)]
pub struct PreBundleReport {
    pub bundled: Vec<PreBundledDep>,
    pub skipped: Vec<SkippedDep>,
}

/// Startup-time dependency pre-bundler.
pub struct PreBundler {
    root: PathBuf,
    deps_dir: PathBuf,
}

impl PreBundler {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        let deps_dir = root.join(PRE_BUNDLE_DIR);
        Self { root, deps_dir }
    }

    /// Directory the artifacts land in. The file watcher must ignore it.
    #[must_use]
    pub fn deps_dir(&self) -> &Path {
        &self.deps_dir
    }

    /// Full run: locate the entry, collect bare imports, write artifacts.
    /// A project without a recognizable entry pre-bundles nothing.
    ///
    /// # Errors
    /// Only when the deps directory itself cannot be created; per-package
    /// failures end up in the report instead.
    pub fn run(&self) -> Result<PreBundleReport, Error> {
        let Some(entry) = self.find_entry() else {
            return Ok(PreBundleReport::default());
        };
        let specifiers = self.collect_bare_imports(&entry);
        self.prebundle(&specifiers)
    }

    /// Project entry: the `index.html` module script if present, otherwise
    /// `src/main.*` by extension probing.
    #[must_use]
    pub fn find_entry(&self) -> Option<PathBuf> {
        if let Ok(html) = std::fs::read_to_string(self.root.join("index.html")) {
            if let Some(src) = module_script_src(&html) {
                let candidate = self.root.join(src.trim_start_matches('/'));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        for ext in resolver::DEFAULT_EXTENSIONS {
            let candidate = self.root.join(format!("src/main{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    /// Walk static imports from `entry`, following relative and absolute
    /// specifiers into other JS modules, and collect every bare specifier.
    #[must_use]
    pub fn collect_bare_imports(&self, entry: &Path) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut queue = vec![entry.to_path_buf()];

        while let Some(path) = queue.pop() {
            if !visited.insert(path.clone()) {
                continue;
            }
            let Ok(source) = std::fs::read_to_string(&path) else {
                continue;
            };
            let importer = path.to_string_lossy();
            for span in scan_imports(&source) {
                let spec = span.specifier.as_str();
                if spec.is_empty() {
                    continue;
                }
                if urls::is_bare_import(spec) {
                    found.insert(spec.to_string());
                    continue;
                }
                if let Ok(target) = resolver::resolve(spec, Some(&importer), &self.root) {
                    if urls::is_js_request(&target.to_string_lossy()) {
                        queue.push(target);
                    }
                }
            }
        }

        found
    }

    /// Write one artifact per specifier into the deps directory.
    ///
    /// # Errors
    /// Only when the deps directory cannot be created.
    pub fn prebundle(&self, specifiers: &BTreeSet<String>) -> Result<PreBundleReport, Error> {
        let mut report = PreBundleReport::default();
        if specifiers.is_empty() {
            return Ok(report);
        }
        std::fs::create_dir_all(&self.deps_dir)?;

        for spec in specifiers {
            match self.bundle_one(spec) {
                Ok(dep) => report.bundled.push(dep),
                Err(reason) => report.skipped.push(SkippedDep {
                    specifier: spec.clone(),
                    reason,
                }),
            }
        }
        Ok(report)
    }

    fn bundle_one(&self, spec: &str) -> Result<PreBundledDep, String> {
        let (pkg, subpath) = split_package(spec);
        let pkg_dir = self.root.join("node_modules").join(pkg);
        if !pkg_dir.is_dir() {
            return Err(format!("package not found under node_modules: {pkg}"));
        }

        let manifest = read_manifest(&pkg_dir);
        let (entry, esm) = resolve_dep_entry(&pkg_dir, &manifest, subpath)
            .ok_or_else(|| format!("no entry file for {spec}"))?;

        let artifact = if esm {
            esm_shim(&urls::file_to_url(&entry.to_string_lossy(), &self.root))
        } else {
            let source = std::fs::read_to_string(&entry).map_err(|e| e.to_string())?;
            cjs_wrapper(&source)
        };

        let output_path = self.deps_dir.join(format!("{spec}.js"));
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&output_path, artifact).map_err(|e| e.to_string())?;

        Ok(PreBundledDep {
            specifier: spec.to_string(),
            output_path,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    #[serde(rename = "type")]
    module_type: Option<String>,
    module: Option<String>,
    main: Option<String>,
}

fn read_manifest(pkg_dir: &Path) -> PackageManifest {
    std::fs::read_to_string(pkg_dir.join("package.json"))
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default()
}

/// Entry file and whether it can be re-exported as ESM directly.
fn resolve_dep_entry(
    pkg_dir: &Path,
    manifest: &PackageManifest,
    subpath: Option<&str>,
) -> Option<(PathBuf, bool)> {
    let type_module = manifest.module_type.as_deref() == Some("module");

    if let Some(sub) = subpath {
        let candidates = [
            pkg_dir.join(sub),
            pkg_dir.join(format!("{sub}.js")),
            pkg_dir.join(format!("{sub}.mjs")),
            pkg_dir.join(sub).join("index.js"),
        ];
        for candidate in candidates {
            if candidate.is_file() {
                let esm = type_module || has_mjs_extension(&candidate);
                return Some((candidate, esm));
            }
        }
        return None;
    }

    if let Some(module) = &manifest.module {
        let entry = pkg_dir.join(module);
        if entry.is_file() {
            return Some((entry, true));
        }
    }

    let main = manifest.main.as_deref().unwrap_or("index.js");
    let entry = pkg_dir.join(main);
    if entry.is_file() {
        let esm = type_module || has_mjs_extension(&entry);
        return Some((entry, esm));
    }
    None
}

fn has_mjs_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "mjs")
}

/// Artifact for an ESM entry: re-export everything, forward the default if
/// the entry has one.
fn esm_shim(entry_url: &str) -> String {
    let quoted = serde_json::Value::String(entry_url.to_string()).to_string();
    format!(
        "import * as __rask_dep from {quoted};\n\
         export * from {quoted};\n\
         export default __rask_dep.default;\n"
    )
}

/// Artifact for a CommonJS entry: evaluate the source against a local
/// `module.exports` and export that object as the default. Named exports
/// cannot be recovered statically, and `require` of further files is not
/// supported in the browser.
fn cjs_wrapper(source: &str) -> String {
    format!(
        "const process = {{ env: {{ NODE_ENV: \"development\" }} }};\n\
         const module = {{ exports: {{}} }};\n\
         const exports = module.exports;\n\
         const require = (id) => {{\n  \
           throw new Error(\"cannot require '\" + id + \"' in the browser\");\n\
         }};\n\
         {source}\n\
         export default module.exports;\n"
    )
}

/// Package-name part of a bare specifier, plus any subpath remainder.
/// Scoped packages keep their first two segments.
fn split_package(specifier: &str) -> (&str, Option<&str>) {
    let mut slashes = specifier.match_indices('/');
    let cut = if specifier.starts_with('@') {
        slashes.nth(1)
    } else {
        slashes.next()
    };
    match cut {
        Some((idx, _)) => (&specifier[..idx], Some(&specifier[idx + 1..])),
        None => (specifier, None),
    }
}

/// `src` attribute of the first `<script type="module">` tag.
fn module_script_src(html: &str) -> Option<String> {
    let mut rest = html;
    while let Some(start) = rest.find("<script") {
        let tag_rest = &rest[start..];
        let end = tag_rest.find('>')?;
        let tag = &tag_rest[..end];
        if tag.contains("type=\"module\"") || tag.contains("type='module'") {
            if let Some(src) = attr_value(tag, "src") {
                return Some(src);
            }
        }
        rest = &tag_rest[end + 1..];
    }
    None
}

fn attr_value(tag: &str, name: &str) -> Option<String> {
    let idx = tag.find(&format!("{name}="))?;
    let after = &tag[idx + name.len() + 1..];
    let quote = after.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let inner = &after[1..];
    let close = inner.find(quote)?;
    Some(inner[..close].to_string())
}
