//! Request URL helpers shared by the pipeline, the rewrite, and the plugins.
//!
//! URLs here are browser-facing request paths (`/src/App.tsx?t=123`). Module
//! ids are absolute filesystem paths. Most helpers operate on the cleaned
//! form with query and hash stripped.

use std::path::Path;

use crate::hmr::CLIENT_PUBLIC_PATH;

/// Extensions the transform pipeline treats as JavaScript modules.
const JS_EXTENSIONS: &[&str] = &[".js", ".jsx", ".ts", ".tsx", ".mjs"];

/// Server-internal request paths that must never go through the module
/// transform pipeline.
const INTERNAL_PATHS: &[&str] = &[CLIENT_PUBLIC_PATH, "/@react-refresh"];

/// Strip hash and query from a request URL.
#[must_use]
pub fn clean_url(url: &str) -> &str {
    let url = url.split('#').next().unwrap_or(url);
    url.split('?').next().unwrap_or(url)
}

/// True if the request should be served as a JavaScript module: a known JS
/// extension, or no extension at all (extensionless imports resolve to JS).
#[must_use]
pub fn is_js_request(id: &str) -> bool {
    let id = clean_url(id);
    if JS_EXTENSIONS.iter().any(|ext| id.ends_with(ext)) {
        return true;
    }
    Path::new(id).extension().is_none() && !id.ends_with('/')
}

#[must_use]
pub fn is_css_request(id: &str) -> bool {
    clean_url(id).ends_with(".css")
}

/// True for asset URLs requested from module code (`import logo from
/// "./logo.svg"` rewrites to `/src/logo.svg?import`). Plain asset fetches
/// without the marker bypass the transform pipeline.
#[must_use]
pub fn is_import_request(url: &str) -> bool {
    url.ends_with("?import")
}

#[must_use]
pub fn remove_import_query(url: &str) -> &str {
    url.strip_suffix("?import").unwrap_or(url)
}

/// Root-relative form of an absolute file path, without the leading slash.
/// Paths outside `root` are returned unchanged.
#[must_use]
pub fn short_name<'a>(file: &'a str, root: &str) -> &'a str {
    file.strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(file)
}

/// Browser-facing URL for an absolute file path: root-relative with a
/// leading slash, or the path itself when the file lives outside the root.
#[must_use]
pub fn file_to_url(file: &str, root: &Path) -> String {
    match Path::new(file).strip_prefix(root) {
        Ok(rel) => format!("/{}", rel.display()),
        Err(_) => file.to_string(),
    }
}

#[must_use]
pub fn is_internal_request(url: &str) -> bool {
    INTERNAL_PATHS.contains(&url)
}

/// Extensions served as static assets. Importing one from module code yields
/// a JS module exporting the asset URL, not the file content.
const ASSET_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".webp", ".avif", ".mp4", ".webm", ".mp3",
    ".wav", ".woff", ".woff2", ".ttf", ".otf", ".wasm",
];

#[must_use]
pub fn is_asset_request(url: &str) -> bool {
    let lower = clean_url(url).to_lowercase();
    ASSET_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// True for package-style specifiers: no leading `.`/`/`, no scheme.
#[must_use]
pub fn is_bare_import(specifier: &str) -> bool {
    if specifier.contains(':') {
        return false;
    }
    specifier
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '@' || c == '_')
}

/// Resolve `.` and `..` segments in a path string without touching the
/// filesystem. Used when joining a specifier onto its importer's directory.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let absolute = path.starts_with('/');

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if out.pop().is_none() && !absolute {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }

    let joined = out.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_url_strips_query_and_hash() {
        assert_eq!(clean_url("/src/App.tsx?t=123"), "/src/App.tsx");
        assert_eq!(clean_url("/src/App.tsx#section"), "/src/App.tsx");
        assert_eq!(clean_url("/src/App.tsx?t=1#x"), "/src/App.tsx");
        assert_eq!(clean_url("/src/App.tsx"), "/src/App.tsx");
    }

    #[test]
    fn test_is_js_request() {
        assert!(is_js_request("/src/main.tsx"));
        assert!(is_js_request("/src/util.js?t=42"));
        assert!(is_js_request("/src/App"));
        assert!(!is_js_request("/src/logo.svg"));
        assert!(!is_js_request("/styles/index.css"));
        assert!(!is_js_request("/src/"));
    }

    #[test]
    fn test_is_css_request() {
        assert!(is_css_request("/styles/index.css"));
        assert!(is_css_request("/styles/index.css?t=9"));
        assert!(!is_css_request("/src/main.tsx"));
    }

    #[test]
    fn test_import_query() {
        assert!(is_import_request("/src/logo.svg?import"));
        assert!(!is_import_request("/src/logo.svg"));
        assert_eq!(remove_import_query("/src/logo.svg?import"), "/src/logo.svg");
        assert_eq!(remove_import_query("/src/logo.svg"), "/src/logo.svg");
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("/proj/src/App.tsx", "/proj"), "src/App.tsx");
        assert_eq!(short_name("/other/file.ts", "/proj"), "/other/file.ts");
    }

    #[test]
    fn test_internal_requests() {
        assert!(is_internal_request("/@rask/client"));
        assert!(is_internal_request("/@react-refresh"));
        assert!(!is_internal_request("/src/main.tsx"));
    }

    #[test]
    fn test_is_asset_request() {
        assert!(is_asset_request("/src/logo.svg"));
        assert!(is_asset_request("./photo.JPG"));
        assert!(is_asset_request("/src/logo.svg?import"));
        assert!(!is_asset_request("/src/App.tsx"));
        assert!(!is_asset_request("/styles/index.css"));
    }

    #[test]
    fn test_is_bare_import() {
        assert!(is_bare_import("react"));
        assert!(is_bare_import("@scope/pkg"));
        assert!(is_bare_import("lodash/merge"));
        assert!(!is_bare_import("./App"));
        assert!(!is_bare_import("../util"));
        assert!(!is_bare_import("/src/App.tsx"));
        assert!(!is_bare_import("https://cdn.example.com/x.js"));
        assert!(!is_bare_import("data:text/javascript,"));
        assert!(!is_bare_import(""));
    }

    #[test]
    fn test_file_to_url() {
        let root = Path::new("/proj");
        assert_eq!(file_to_url("/proj/src/App.tsx", root), "/src/App.tsx");
        assert_eq!(file_to_url("/proj/index.html", root), "/index.html");
        assert_eq!(file_to_url("/elsewhere/x.ts", root), "/elsewhere/x.ts");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/proj/src/./logo.svg"), "/proj/src/logo.svg");
        assert_eq!(normalize_path("/proj/src/../logo.svg"), "/proj/logo.svg");
        assert_eq!(normalize_path("./a/b"), "a/b");
        assert_eq!(normalize_path("../a"), "../a");
        assert_eq!(normalize_path("/a/b/../../c"), "/c");
    }
}
