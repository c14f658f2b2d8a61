//! Specifier-to-path resolution.
//!
//! Maps import specifiers to absolute filesystem paths by probing the disk.
//! Handles absolute specifiers (as-is, then joined under the project root)
//! and relative specifiers (against the importer's directory, with extension
//! probing). Bare package specifiers are deliberately not handled here; the
//! import rewrite points them at the pre-bundle directory instead.

use std::path::{Path, PathBuf};

use crate::error::Error;

/// Extensions probed, in order, when a relative specifier has none.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".tsx", ".ts", ".jsx", ".js"];

/// Resolve `specifier` to an absolute path on disk.
///
/// Pure filesystem probing, no side effects. A relative specifier without an
/// importer is a caller bug and fails with [`Error::MissingImporter`]; every
/// other miss is [`Error::NotFound`].
///
/// # Errors
/// `MissingImporter` for a relative specifier with no importer; `NotFound`
/// when no candidate path exists on disk (including bare specifiers, which
/// this component never resolves).
pub fn resolve(specifier: &str, importer: Option<&str>, root: &Path) -> Result<PathBuf, Error> {
    if specifier.starts_with('/') {
        return resolve_absolute(specifier, root);
    }

    if specifier.starts_with('.') {
        let Some(importer) = importer else {
            return Err(Error::MissingImporter {
                specifier: specifier.to_string(),
            });
        };
        return resolve_relative(specifier, importer);
    }

    Err(Error::not_found(specifier))
}

fn resolve_absolute(specifier: &str, root: &Path) -> Result<PathBuf, Error> {
    let as_is = Path::new(specifier);
    if as_is.is_file() {
        return Ok(as_is.to_path_buf());
    }

    let under_root = root.join(specifier.trim_start_matches('/'));
    if under_root.is_file() {
        return Ok(under_root);
    }

    Err(Error::not_found(specifier))
}

fn resolve_relative(specifier: &str, importer: &str) -> Result<PathBuf, Error> {
    let base = Path::new(importer)
        .parent()
        .unwrap_or_else(|| Path::new("/"));

    if has_extension(specifier) {
        let candidate = join_normalized(base, specifier);
        if candidate.is_file() {
            return Ok(candidate);
        }
        return Err(Error::not_found(specifier));
    }

    for ext in DEFAULT_EXTENSIONS {
        let candidate = join_normalized(base, &format!("{specifier}{ext}"));
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(Error::not_found(specifier))
}

fn has_extension(specifier: &str) -> bool {
    Path::new(specifier).extension().is_some()
}

fn join_normalized(base: &Path, specifier: &str) -> PathBuf {
    let joined = format!("{}/{}", base.display(), specifier);
    PathBuf::from(crate::urls::normalize_path(&joined))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_relative_probes_extensions_in_order() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("App.tsx"), "export default 1;").unwrap();

        let importer = src.join("main.tsx");
        fs::write(&importer, "import App from './App';").unwrap();

        let resolved = resolve("./App", Some(importer.to_str().unwrap()), dir.path()).unwrap();
        assert_eq!(resolved, src.join("App.tsx"));
    }

    #[test]
    fn test_probe_order_prefers_tsx() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("mod.tsx"), "a").unwrap();
        fs::write(dir.path().join("mod.js"), "b").unwrap();
        let importer = dir.path().join("main.js");
        fs::write(&importer, "").unwrap();

        let resolved = resolve("./mod", Some(importer.to_str().unwrap()), dir.path()).unwrap();
        assert_eq!(resolved, dir.path().join("mod.tsx"));
    }

    #[test]
    fn test_relative_with_extension_resolves_directly() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("util.js"), "x").unwrap();
        let importer = dir.path().join("main.js");
        fs::write(&importer, "").unwrap();

        let resolved = resolve("./util.js", Some(importer.to_str().unwrap()), dir.path()).unwrap();
        assert_eq!(resolved, dir.path().join("util.js"));

        let err = resolve("./missing.js", Some(importer.to_str().unwrap()), dir.path());
        assert!(matches!(err, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_relative_without_importer_is_a_caller_bug() {
        let dir = tempdir().unwrap();
        let err = resolve("./App", None, dir.path());
        assert!(matches!(err, Err(Error::MissingImporter { .. })));
    }

    #[test]
    fn test_relative_not_found_when_no_candidate_exists() {
        let dir = tempdir().unwrap();
        let importer = dir.path().join("main.js");
        fs::write(&importer, "").unwrap();

        let err = resolve("./App", Some(importer.to_str().unwrap()), dir.path());
        assert!(matches!(err, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_absolute_joined_under_root() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("main.tsx"), "x").unwrap();

        let resolved = resolve("/src/main.tsx", None, dir.path()).unwrap();
        assert_eq!(resolved, src.join("main.tsx"));
    }

    #[test]
    fn test_absolute_as_is_wins_over_root_join() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("real.js");
        fs::write(&file, "x").unwrap();

        let resolved = resolve(file.to_str().unwrap(), None, dir.path()).unwrap();
        assert_eq!(resolved, file);
    }

    #[test]
    fn test_bare_specifier_is_not_resolved_here() {
        let dir = tempdir().unwrap();
        let err = resolve("react", None, dir.path());
        assert!(matches!(err, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_parent_traversal_in_specifier() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let lib = dir.path().join("lib");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&lib).unwrap();
        fs::write(lib.join("helper.ts"), "x").unwrap();
        let importer = src.join("main.ts");
        fs::write(&importer, "").unwrap();

        let resolved =
            resolve("../lib/helper", Some(importer.to_str().unwrap()), dir.path()).unwrap();
        assert_eq!(resolved, lib.join("helper.ts"));
    }
}
