//! `rask dev` command implementation.
//!
//! No-bundle development server: every ES module is served as its own
//! request through the resolve → load → transform pipeline, with updates
//! pushed over a WebSocket.
//!
//! ```text
//! Browser requests GET /src/main.js
//!   → resolve (plugin hooks + extension probing)
//!   → load (plugin hooks + file system)
//!   → transform (import rewrite, CSS/asset wrapping, HMR bootstrap)
//!   → serve as application/javascript
//! ```
//!
//! Bare imports are pre-bundled on startup into `node_modules/.rask/deps/`
//! and served from there with immutable cache headers.

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use miette::{IntoDiagnostic, Result};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use rask_core::{
    default_plugins, urls, ClientMessage, PreBundler, RequestPipeline, ServerMessage,
    CLIENT_PUBLIC_PATH, CLIENT_RUNTIME, HMR_PATH, PRE_BUNDLE_DIR,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Dev server action.
#[derive(Debug, Clone)]
pub struct DevAction {
    /// Project root directory.
    pub root: PathBuf,
    /// Port to listen on.
    pub port: u16,
    /// Host to bind to.
    pub host: String,
    /// Open browser automatically.
    pub open: bool,
}

/// Optional `rask.config.json` at the project root.
#[derive(Debug, Default, Deserialize)]
struct RaskConfig {
    port: Option<u16>,
    host: Option<String>,
    open: Option<bool>,
}

/// Walk up from `cwd` looking for a project marker.
///
/// `package.json` or a `.git` directory marks the root; falls back to `cwd`
/// itself when nothing matches.
#[must_use]
pub fn find_project_root(cwd: &Path) -> PathBuf {
    let mut current = Some(cwd);
    while let Some(dir) = current {
        if dir.join("package.json").is_file() || dir.join(".git").exists() {
            return dir.to_path_buf();
        }
        current = dir.parent();
    }
    cwd.to_path_buf()
}

fn load_config(root: &Path) -> RaskConfig {
    let path = root.join("rask.config.json");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return RaskConfig::default();
    };
    match serde_json::from_str(&text) {
        Ok(config) => {
            info!(config = %path.display(), "loaded project config");
            config
        }
        Err(err) => {
            warn!(config = %path.display(), error = %err, "ignoring unparseable config");
            RaskConfig::default()
        }
    }
}

/// Run the dev server until the process is stopped.
pub async fn run(action: DevAction) -> Result<()> {
    let root = action.root.canonicalize().into_diagnostic()?;

    // CLI flags win when explicitly set; the clap defaults double as the
    // "not set" sentinels for the config file merge.
    let config = load_config(&root);
    let port = if action.port == DEFAULT_PORT {
        config.port.unwrap_or(DEFAULT_PORT)
    } else {
        action.port
    };
    let host = if action.host == DEFAULT_HOST {
        config.host.unwrap_or_else(|| DEFAULT_HOST.to_string())
    } else {
        action.host
    };
    let open = action.open || config.open.unwrap_or(false);

    // Pre-bundle bare imports before the first request can ask for them.
    match PreBundler::new(root.clone()).run() {
        Ok(report) => {
            if !report.bundled.is_empty() {
                info!(deps = report.bundled.len(), "pre-bundled dependencies");
            }
            for skipped in &report.skipped {
                warn!(specifier = %skipped.specifier, reason = %skipped.reason, "pre-bundle skipped");
            }
        }
        Err(err) => warn!(error = %err, "pre-bundling failed, serving without it"),
    }

    let pipeline = RequestPipeline::new(root.clone(), default_plugins(root.clone()))
        .await
        .into_diagnostic()?;
    let state = Arc::new(pipeline);

    // notify runs on its own thread; change batches cross into the runtime
    // through a bounded channel.
    let (file_change_tx, mut file_change_rx) = mpsc::channel::<Vec<PathBuf>>(16);
    let watch_root = root.clone();
    std::thread::spawn(move || {
        if let Err(err) = watch_files(watch_root, &file_change_tx) {
            warn!(error = %err, "file watcher stopped");
        }
    });

    let change_state = state.clone();
    tokio::spawn(async move {
        while let Some(changed) = file_change_rx.recv().await {
            handle_file_changes(&change_state, changed).await;
        }
    });

    let app = Router::new()
        .route("/", get(serve_index))
        .route("/index.html", get(serve_index))
        .route(HMR_PATH, get(hmr_websocket))
        .route(CLIENT_PUBLIC_PATH, get(serve_client_runtime))
        .route("/*path", get(serve_request))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let host_ip = if host == "localhost" {
        "127.0.0.1".to_string()
    } else {
        host.clone()
    };
    let addr: SocketAddr = format!("{host_ip}:{port}").parse().into_diagnostic()?;

    println!();
    println!("  rask dev server running at http://{host}:{port}");
    println!("  serving {}", root.display());
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    if open {
        let url = format!("http://{host}:{port}");
        let _ = open_browser(&url);
    }

    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    axum::serve(listener, app).await.into_diagnostic()?;

    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

type AppState = Arc<RequestPipeline>;

/// Serve the project's `index.html` as-is.
async fn serve_index(State(state): State<AppState>) -> Response {
    index_response(&state).await
}

async fn index_response(state: &RequestPipeline) -> Response {
    let index_path = state.server().root.join("index.html");
    match tokio::fs::read_to_string(&index_path).await {
        Ok(html) => Html(html).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "index.html not found".to_string()).into_response(),
    }
}

/// Serve the HMR client runtime.
async fn serve_client_runtime() -> impl IntoResponse {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/javascript")
        .header("Cache-Control", "no-cache")
        .body(CLIENT_RUNTIME.to_string())
        .unwrap()
}

/// Transform middleware plus static fallback.
///
/// JS, CSS, and `?import` requests run the plugin pipeline; everything else
/// is served from disk. Extensionless misses fall back to `index.html` so
/// client-side routes survive a refresh.
async fn serve_request(State(state): State<AppState>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    let raw_url = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.clone(),
    };

    if urls::is_js_request(&path) || urls::is_css_request(&path) || urls::is_import_request(&raw_url)
    {
        return transform_response(&state, &raw_url, &path).await;
    }
    static_response(&state, &path).await
}

async fn transform_response(state: &RequestPipeline, raw_url: &str, path: &str) -> Response {
    match state.transform_request(raw_url).await {
        Ok(result) => {
            // Pre-bundle artifacts never change within a session; let the
            // browser keep them.
            let cache_control = if path.contains(PRE_BUNDLE_DIR) {
                "max-age=31536000, immutable"
            } else {
                "no-cache"
            };
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "application/javascript")
                .header("Cache-Control", cache_control)
                .body(result.code)
                .unwrap()
                .into_response()
        }
        Err(err) if err.is_not_found() => {
            if Path::new(path).extension().is_none() {
                // Client-side route, not a module id.
                return index_response(state).await;
            }
            debug!(url = %raw_url, "module not found");
            (StatusCode::NOT_FOUND, format!("Not found: {raw_url}")).into_response()
        }
        Err(err) => {
            warn!(url = %raw_url, error = %err, "transform failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn static_response(state: &RequestPipeline, path: &str) -> Response {
    let root = &state.server().root;
    let Some(file) = resolve_static_path(root, path) else {
        if Path::new(path).extension().is_none() {
            return index_response(state).await;
        }
        return (StatusCode::NOT_FOUND, format!("Not found: {path}")).into_response();
    };
    match tokio::fs::read(&file).await {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", content_type_for(&file))
            .header("Cache-Control", "no-cache")
            .body(Body::from(bytes))
            .unwrap(),
        Err(_) => (StatusCode::NOT_FOUND, format!("Not found: {path}")).into_response(),
    }
}

/// Root-relative first; absolute filesystem paths (pre-bundle artifacts,
/// `node_modules` entry files) as written.
fn resolve_static_path(root: &Path, url_path: &str) -> Option<PathBuf> {
    let relative = root.join(url_path.trim_start_matches('/'));
    if relative.is_file() {
        return Some(relative);
    }
    let absolute = Path::new(url_path);
    if absolute.is_file() {
        return Some(absolute.to_path_buf());
    }
    None
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "html" => "text/html",
        "css" => "text/css",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "wasm" => "application/wasm",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

// ============================================================================
// WebSocket HMR
// ============================================================================

/// Upgrade `/__hmr` connections.
async fn hmr_websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_hmr_socket(socket, state))
}

/// Drive one HMR socket: greet, then forward broadcast updates while
/// accepting client messages.
async fn handle_hmr_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.server().hmr.subscribe();

    if let Ok(hello) = serde_json::to_string(&ServerMessage::Connected) {
        if socket.send(Message::Text(hello)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(message) => {
                    let Ok(json) = serde_json::to_string(&message) else {
                        continue;
                    };
                    if socket.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => handle_client_message(&state, &text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
}

fn handle_client_message(state: &RequestPipeline, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::HotAccept { path }) => {
            debug!(%path, "client accepted module");
            state.graph().mark_self_accepting(&path);
        }
        Err(_) => debug!(message = text, "unhandled client message"),
    }
}

// ============================================================================
// File Watching
// ============================================================================

const WATCHED_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "css", "json", "html", "svg",
];

/// Paths the watcher never reports.
fn should_ignore(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    if path_str.contains("/node_modules/")
        || path_str.contains("/.git/")
        || path_str.contains("/dist/")
        || path_str.contains("/target/")
    {
        return true;
    }
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}

/// Watch the project tree, debounce, and push batches of changed paths.
///
/// notify delivers raw events on its own schedule; a 50ms window collapses
/// editor write bursts into one batch.
fn watch_files(root: PathBuf, file_change_tx: &mpsc::Sender<Vec<PathBuf>>) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();

    let mut watcher = RecommendedWatcher::new(tx, Config::default()).into_diagnostic()?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .into_diagnostic()?;

    let mut debounce_set: HashSet<PathBuf> = HashSet::new();
    let mut last_change = std::time::Instant::now();

    loop {
        match rx.recv() {
            Ok(Ok(event)) => {
                for path in event.paths {
                    if should_ignore(&path) {
                        continue;
                    }
                    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                    if WATCHED_EXTENSIONS.contains(&ext) {
                        debounce_set.insert(path);
                    }
                }

                let now = std::time::Instant::now();
                if now.duration_since(last_change).as_millis() < 50 || debounce_set.is_empty() {
                    continue;
                }

                let changed: Vec<PathBuf> = debounce_set.drain().collect();
                last_change = now;

                if file_change_tx.blocking_send(changed).is_err() {
                    break;
                }
            }
            Ok(Err(err)) => warn!(error = %err, "watch event error"),
            Err(_) => break,
        }
    }

    Ok(())
}

/// Invalidate changed modules and broadcast the resulting HMR decisions.
async fn handle_file_changes(state: &RequestPipeline, changed: Vec<PathBuf>) {
    for path in changed {
        let file = path.display().to_string();
        match state.on_file_change(&file).await {
            Some(ServerMessage::Update { updates }) => {
                info!(file = %path.display(), updates = updates.len(), "hmr update");
            }
            Some(_) => info!(file = %path.display(), "full reload"),
            None => debug!(file = %path.display(), "change outside the module graph"),
        }
    }
}

// ============================================================================
// Utilities
// ============================================================================

/// Open a URL in the default browser.
fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", url])
            .spawn()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_project_root_stops_at_package_json() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("app");
        let nested = root.join("src").join("components");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join("package.json"), "{}").unwrap();

        assert_eq!(find_project_root(&nested), root);
    }

    #[test]
    fn test_find_project_root_falls_back_to_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("plain");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_project_root(&nested), nested);
    }

    #[test]
    fn test_should_ignore_filters_vendored_and_hidden_paths() {
        assert!(should_ignore(Path::new("/app/node_modules/react/index.js")));
        assert!(should_ignore(Path::new("/app/.git/HEAD")));
        assert!(should_ignore(Path::new("/app/src/.main.js.swp")));
        assert!(!should_ignore(Path::new("/app/src/main.js")));
    }

    #[test]
    fn test_content_type_for_common_extensions() {
        assert_eq!(content_type_for(Path::new("a.svg")), "image/svg+xml");
        assert_eq!(content_type_for(Path::new("a.png")), "image/png");
        assert_eq!(
            content_type_for(Path::new("a.bin")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_config_parses_partial_fields() {
        let config: RaskConfig = serde_json::from_str(r#"{"port": 5000}"#).unwrap();
        assert_eq!(config.port, Some(5000));
        assert_eq!(config.host, None);
        assert_eq!(config.open, None);
    }

    #[test]
    fn test_resolve_static_path_prefers_root_relative() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("logo.svg"), "<svg/>").unwrap();

        let hit = resolve_static_path(dir.path(), "/logo.svg");
        assert_eq!(hit, Some(dir.path().join("logo.svg")));
        assert_eq!(resolve_static_path(dir.path(), "/missing.svg"), None);
    }
}
