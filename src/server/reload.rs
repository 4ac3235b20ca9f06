//! Live reload channel
//!
//! Build tasks publish [`ReloadMessage`]s on a broadcast channel; every
//! browser connected to the `/__livereload` WebSocket receives them as JSON.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Path of the live reload WebSocket endpoint
pub const LIVE_RELOAD_PATH: &str = "/__livereload";

/// Live reload message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ReloadMessage {
    /// Connection established
    Connected,

    /// Full page reload required
    Reload { reason: String },

    /// Stylesheets changed and can be swapped in place
    CssUpdate { paths: Vec<String> },
}

/// Handle for publishing reload notifications. Cheap to clone; a disabled
/// handle drops every message.
#[derive(Debug, Clone)]
pub struct LiveReload {
    tx: Option<broadcast::Sender<ReloadMessage>>,
}

impl Default for LiveReload {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveReload {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Subscribe to notifications. A disabled handle yields a receiver that
    /// never receives anything.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        match &self.tx {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Ask every connected browser to reload the page
    pub fn reload_all(&self, reason: impl Into<String>) {
        self.send(ReloadMessage::Reload {
            reason: reason.into(),
        });
    }

    /// Tell connected browsers which stylesheets changed
    pub fn css_updated(&self, paths: Vec<String>) {
        if paths.is_empty() {
            return;
        }
        self.send(ReloadMessage::CssUpdate { paths });
    }

    fn send(&self, message: ReloadMessage) {
        if let Some(tx) = &self.tx {
            // No subscribers is not an error
            let _ = tx.send(message);
        }
    }
}

/// Handle WebSocket upgrade for live reload
pub async fn live_reload_websocket(
    ws: WebSocketUpgrade,
    State(reload): State<LiveReload>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, reload))
}

async fn handle_socket(socket: WebSocket, reload: LiveReload) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = reload.subscribe();

    if let Ok(json) = serde_json::to_string(&ReloadMessage::Connected) {
        if sender.send(Message::Text(json)).await.is_err() {
            return;
        }
    }
    debug!("Live reload client connected");

    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(message) => {
                    let Ok(json) = serde_json::to_string(&message) else {
                        continue;
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Live reload client lagged by {} message(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    debug!("Live reload client disconnected");
}

const CLIENT_SCRIPT: &str = r#"
<script>
(function() {
  var ws = new WebSocket('ws://' + location.host + '/__livereload');

  ws.onmessage = function(event) {
    var message = JSON.parse(event.data);

    switch (message.type) {
      case 'reload':
        console.log('[livereload] Reload:', message.reason);
        location.reload();
        break;

      case 'css-update':
        console.log('[livereload] CSS update:', message.paths);
        document.querySelectorAll('link[rel="stylesheet"]').forEach(function(link) {
          var url = new URL(link.href);
          if (message.paths.indexOf(url.pathname) === -1) return;
          url.searchParams.set('t', Date.now());
          link.href = url.toString();
        });
        break;

      case 'connected':
        console.log('[livereload] Connected');
        break;
    }
  };

  ws.onclose = function() {
    console.log('[livereload] Disconnected, reloading when the server is back...');
    setTimeout(function() { location.reload(); }, 1000);
  };
})();
</script>
"#;

/// Inject the live reload client before `</body>`, or append it
pub fn inject_client(html: &str) -> String {
    match html.rfind("</body>") {
        Some(pos) => {
            let mut result = String::with_capacity(html.len() + CLIENT_SCRIPT.len());
            result.push_str(&html[..pos]);
            result.push_str(CLIENT_SCRIPT);
            result.push_str(&html[pos..]);
            result
        }
        None => format!("{}{}", html, CLIENT_SCRIPT),
    }
}
