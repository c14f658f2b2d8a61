//! Hot-module-replacement wire protocol and client runtime.
//!
//! The server pushes JSON messages over a WebSocket at [`HMR_PATH`]; the
//! client runtime served at [`CLIENT_PUBLIC_PATH`] applies them by
//! re-importing updated modules with a cache-busting query. The only message
//! the client sends back is `hotAccept`, which tells the server a module
//! registered `import.meta.hot.accept()` and can absorb its own updates.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::graph::HmrBoundary;

/// URL of the HMR client runtime module.
pub const CLIENT_PUBLIC_PATH: &str = "/@rask/client";

/// WebSocket endpoint for HMR messages.
pub const HMR_PATH: &str = "/__hmr";

/// Server-to-client messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Handshake right after the socket opens.
    Connected,
    /// One or more module updates the client can apply without reloading.
    Update { updates: Vec<UpdatePayload> },
    /// No HMR boundary absorbed the change; reload the page.
    FullReload,
}

/// One applied update inside a [`ServerMessage::Update`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    /// URL the client re-imports.
    pub path: String,
    /// URL whose accept callback handles the new module.
    pub accepted_path: String,
    /// Invalidation timestamp, appended as `?t=` on the re-import.
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UpdateKind {
    #[serde(rename = "js-update")]
    JsUpdate,
}

/// Client-to-server messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// A module registered a self-accept handler.
    HotAccept { path: String },
}

/// Build the update message for a set of boundaries produced by
/// [`crate::graph::ModuleGraph::hmr_boundaries`].
#[must_use]
pub fn update_message(boundaries: &[HmrBoundary], timestamp: u64) -> ServerMessage {
    ServerMessage::Update {
        updates: boundaries
            .iter()
            .map(|b| UpdatePayload {
                kind: UpdateKind::JsUpdate,
                path: b.boundary_url.clone(),
                accepted_path: b.accepted_url.clone(),
                timestamp,
            })
            .collect(),
    }
}

/// Broadcast handle for pushing HMR messages to every connected client.
/// Cheap to clone; sending with no connected clients is a no-op.
#[derive(Debug, Clone)]
pub struct HmrSender {
    tx: broadcast::Sender<ServerMessage>,
}

impl HmrSender {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.tx.subscribe()
    }

    /// Send to all connected clients, returning how many received it.
    pub fn send(&self, message: ServerMessage) -> usize {
        self.tx.send(message).unwrap_or(0)
    }
}

impl Default for HmrSender {
    fn default() -> Self {
        Self::new(16)
    }
}

/// The two bootstrap lines prepended to every served application module:
/// import the client runtime, then bind an `import.meta.hot` context to this
/// module's URL.
#[must_use]
pub fn hot_context_preamble(url: &str) -> String {
    let quoted = serde_json::Value::String(url.to_string()).to_string();
    format!(
        "import {{ createHotContext as __rask_createHotContext }} from \"{CLIENT_PUBLIC_PATH}\";\nimport.meta.hot = __rask_createHotContext({quoted});\n"
    )
}

/// The HMR client runtime, served verbatim at [`CLIENT_PUBLIC_PATH`].
///
/// Provides `import.meta.hot` with `accept`, `dispose`, `data`, and
/// `invalidate`. Accept registrations made before the socket opens are
/// queued and flushed on connect, so modules evaluated during page load are
/// not lost.
pub const CLIENT_RUNTIME: &str = r"
// rask HMR client runtime
const hotModulesMap = new Map();
const disposeMap = new Map();
const dataMap = new Map();
const pendingAccepts = [];

let ws;
let wasConnected = false;

function setup() {
  const proto = location.protocol === 'https:' ? 'wss' : 'ws';
  ws = new WebSocket(`${proto}://${location.host}/__hmr`);

  ws.onopen = () => {
    wasConnected = true;
    for (const path of pendingAccepts.splice(0)) {
      ws.send(JSON.stringify({ type: 'hotAccept', path }));
    }
  };

  ws.onmessage = (event) => {
    handleMessage(JSON.parse(event.data));
  };

  ws.onclose = () => {
    if (wasConnected) {
      console.log('[rask] server connection lost, reloading...');
      setTimeout(() => location.reload(), 1000);
    }
  };
}

function handleMessage(msg) {
  switch (msg.type) {
    case 'connected':
      console.log('[rask] connected.');
      break;
    case 'update':
      for (const update of msg.updates) {
        applyUpdate(update);
      }
      break;
    case 'full-reload':
      location.reload();
      break;
  }
}

async function applyUpdate(update) {
  const entry = hotModulesMap.get(update.acceptedPath);
  if (!entry) {
    location.reload();
    return;
  }

  const dispose = disposeMap.get(update.acceptedPath);
  if (dispose) {
    dispose(dataMap.get(update.acceptedPath) || {});
  }

  try {
    const next = await import(update.path + '?t=' + update.timestamp);
    if (entry.callback) {
      entry.callback(next);
    }
    console.log(`[rask] hot updated: ${update.path}`);
  } catch (err) {
    console.error(`[rask] update failed for ${update.path}`, err);
    location.reload();
  }
}

function sendAccept(path) {
  if (ws && ws.readyState === WebSocket.OPEN) {
    ws.send(JSON.stringify({ type: 'hotAccept', path }));
  } else {
    pendingAccepts.push(path);
  }
}

const styleMap = new Map();

export function updateStyle(id, css) {
  let el = styleMap.get(id);
  if (!el) {
    el = document.createElement('style');
    el.setAttribute('type', 'text/css');
    document.head.appendChild(el);
    styleMap.set(id, el);
  }
  el.textContent = css;
}

export function removeStyle(id) {
  const el = styleMap.get(id);
  if (el) {
    document.head.removeChild(el);
    styleMap.delete(id);
  }
}

export function createHotContext(ownerPath) {
  if (!dataMap.has(ownerPath)) {
    dataMap.set(ownerPath, {});
  }

  return {
    get data() {
      return dataMap.get(ownerPath);
    },

    accept(callback) {
      hotModulesMap.set(ownerPath, {
        callback: typeof callback === 'function' ? callback : undefined,
      });
      sendAccept(ownerPath);
    },

    dispose(callback) {
      disposeMap.set(ownerPath, callback);
    },

    invalidate() {
      location.reload();
    },
  };
}

setup();
";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_message_wire_format() {
        let boundaries = vec![HmrBoundary {
            boundary_url: "/src/App.tsx".to_string(),
            accepted_url: "/src/App.tsx".to_string(),
        }];
        let message = update_message(&boundaries, 1700000000123);

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "update",
                "updates": [{
                    "type": "js-update",
                    "path": "/src/App.tsx",
                    "acceptedPath": "/src/App.tsx",
                    "timestamp": 1700000000123u64,
                }],
            })
        );
    }

    #[test]
    fn test_full_reload_wire_format() {
        let value = serde_json::to_value(ServerMessage::FullReload).unwrap();
        assert_eq!(value, json!({ "type": "full-reload" }));
        let connected = serde_json::to_value(ServerMessage::Connected).unwrap();
        assert_eq!(connected, json!({ "type": "connected" }));
    }

    #[test]
    fn test_client_message_parses() {
        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type":"hotAccept","path":"/src/App.tsx"}"#).unwrap();
        assert_eq!(
            parsed,
            ClientMessage::HotAccept {
                path: "/src/App.tsx".to_string()
            }
        );
    }

    #[test]
    fn test_preamble_binds_module_url() {
        let preamble = hot_context_preamble("/src/App.tsx");
        assert!(preamble.contains(CLIENT_PUBLIC_PATH));
        assert!(preamble.contains(r#"__rask_createHotContext("/src/App.tsx")"#));
        // Exactly two lines of bootstrap
        assert_eq!(preamble.lines().count(), 2);
    }

    #[test]
    fn test_client_runtime_speaks_the_protocol() {
        assert!(CLIENT_RUNTIME.contains("createHotContext"));
        assert!(CLIENT_RUNTIME.contains("hotAccept"));
        assert!(CLIENT_RUNTIME.contains("full-reload"));
        assert!(CLIENT_RUNTIME.contains("__hmr"));
        // Style injection entry points used by served CSS wrappers
        assert!(CLIENT_RUNTIME.contains("export function updateStyle"));
        assert!(CLIENT_RUNTIME.contains("export function removeStyle"));
    }

    #[tokio::test]
    async fn test_sender_reaches_subscribers() {
        let sender = HmrSender::new(4);
        assert_eq!(sender.send(ServerMessage::Connected), 0);

        let mut rx = sender.subscribe();
        assert_eq!(sender.send(ServerMessage::FullReload), 1);
        assert_eq!(rx.recv().await.unwrap(), ServerMessage::FullReload);
    }
}
