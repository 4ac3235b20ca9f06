//! Development server with live reload
//!
//! Provides a local development server with:
//! - Static file serving from the output tree
//! - A WebSocket live reload channel, with in-place stylesheet swaps
//! - File watching and incremental rebuilds

mod reload;
mod watch;

use std::borrow::Cow;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{FromRef, Request, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, error, info};

use crate::cli::DevServerOptions;
use crate::orchestrator::Orchestrator;
use crate::utils::clean_path;

pub use reload::{inject_client, LiveReload, ReloadMessage, LIVE_RELOAD_PATH};
pub use watch::{spawn_watcher, WatchAction, WatchBindings};

/// Shared server state
pub(crate) struct ServerState {
    /// Directory served at `/`
    output_dir: PathBuf,

    /// Live reload channel
    reload: LiveReload,
}

impl FromRef<Arc<ServerState>> for LiveReload {
    fn from_ref(state: &Arc<ServerState>) -> Self {
        state.reload.clone()
    }
}

/// Development server
pub struct DevServer {
    orchestrator: Arc<Orchestrator>,

    /// Server options
    options: DevServerOptions,
}

impl DevServer {
    /// Create a new development server
    pub fn new(orchestrator: Arc<Orchestrator>, options: DevServerOptions) -> Self {
        Self {
            orchestrator,
            options,
        }
    }

    /// Start watching and serving. Runs until the process is interrupted.
    pub async fn start(&self) -> Result<()> {
        let config = self.orchestrator.config();
        let reload = self.orchestrator.context().reload.clone();

        spawn_watcher(
            self.orchestrator.clone(),
            std::time::Duration::from_millis(config.server.debounce_ms),
        )?;

        let app = router(config.output_dir(), reload);

        let listener = tokio::net::TcpListener::bind((self.options.host.as_str(), self.options.port))
            .await
            .with_context(|| {
                format!("Failed to bind {}:{}", self.options.host, self.options.port)
            })?;
        let url = format!("http://{}:{}", self.options.host, self.options.port);

        // Open browser if requested
        if self.options.open {
            if let Err(e) = webbrowser_open(&url) {
                debug!("Failed to open browser: {}", e);
            }
        }

        info!("Server listening on {}", url);
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Build the router serving `output_dir`
pub fn router(output_dir: PathBuf, reload: LiveReload) -> Router {
    let state = Arc::new(ServerState { output_dir, reload });

    Router::new()
        .route(LIVE_RELOAD_PATH, get(reload::live_reload_websocket))
        .fallback(serve)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve a file from the output tree. Pages get the live reload client.
async fn serve(State(state): State<Arc<ServerState>>, request: Request) -> Response {
    let relative = {
        let raw = request.uri().path();
        clean_path(&urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw)))
    };
    let mut path = state.output_dir.join(relative.trim_start_matches('/'));

    if tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
        path = path.join("index.html");
    }

    let is_page = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("html") | Some("htm")
    );
    if is_page && state.reload.is_enabled() {
        return match tokio::fs::read_to_string(&path).await {
            Ok(content) => Html(inject_client(&content)).into_response(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                (StatusCode::NOT_FOUND, format!("Not found: {}", relative)).into_response()
            }
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response()
            }
        };
    }

    match ServeDir::new(&state.output_dir).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// Open URL in browser (simple implementation)
fn webbrowser_open(url: &str) -> Result<()> {
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
