//! Loopback HTTP control plane
//!
//! Routes:
//! - `POST /cmd`: receive a command (`{"v":1,"ts":1730000000000,"source":"mbbridge"}`)
//! - `GET /health`: liveness, never requires the token
//!
//! Every response body is `{"ok":0|1,"err"?:..,"app"?:..}`.

use crate::domain::auth;
use crate::domain::error::{BridgeError, BridgeResult};
use crate::domain::models::{ApiResponse, Command, WireCommand};
use crate::domain::router::BridgeContext;
use crate::domain::settings::validate_port;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::any::Any;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{debug, error, info, warn};

/// The listener never binds anything but loopback.
pub const BIND_HOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Identifier reported by `GET /health`.
pub const APP_ID: &str = "MBBridgeCtrl";

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type ApiReply = (StatusCode, Json<ApiResponse>);

#[derive(Clone)]
pub struct ServerState {
    context: Arc<BridgeContext>,
    token: Arc<RwLock<Option<String>>>,
}

impl ServerState {
    pub fn new(context: Arc<BridgeContext>, token: Option<String>) -> Self {
        Self {
            context,
            token: Arc::new(RwLock::new(normalize_token(token))),
        }
    }

    fn configured_token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }
}

fn normalize_token(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

pub fn build_router(state: ServerState) -> Router {
    with_layers(routes(), state)
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/cmd", post(handle_command).fallback(handle_not_found))
        .route("/health", get(handle_health).fallback(handle_not_found))
        .fallback(handle_not_found)
}

fn with_layers(router: Router<ServerState>, state: ServerState) -> Router {
    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

async fn handle_command(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiReply {
    info!("POST /cmd - Command request received");

    let body = match std::str::from_utf8(&body) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            warn!("Empty request body");
            return bad_request("Bad request: Empty body");
        }
        Err(_) => {
            warn!("Request body is not UTF-8");
            return bad_request("Bad request: Invalid JSON format");
        }
    };
    debug!("Request body: {}", body);

    let wire = match WireCommand::from_json(body) {
        Ok(wire) => wire,
        Err(e) => {
            warn!("Invalid JSON format: {}", e);
            return bad_request("Bad request: Invalid JSON format");
        }
    };

    let provided = auth::credential_from_headers(
        headers
            .iter()
            .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?))),
    );
    let configured = state.configured_token();
    if !auth::verify(configured.as_deref(), provided) {
        warn!("Token validation failed, provided={}", auth::redact(provided));
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Unauthorized: Invalid or missing token")),
        );
    }

    let command = Command::from(wire);
    info!(
        "Command parsed: type={}, v={}, ts={}, source={}",
        command.kind(),
        command.kind().value(),
        command.timestamp(),
        command.source()
    );
    state.context.router.route_network(command);

    (StatusCode::OK, Json(ApiResponse::success()))
}

async fn handle_health() -> ApiReply {
    debug!("GET /health - Health check");
    (StatusCode::OK, Json(ApiResponse::with_app(APP_ID)))
}

async fn handle_not_found() -> ApiReply {
    warn!("404 Not Found");
    (StatusCode::NOT_FOUND, Json(ApiResponse::error("Not found")))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown error".to_string()
    };
    error!("Error handling request: {}", detail);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::error(format!("Internal server error: {detail}"))),
    )
        .into_response()
}

fn bad_request(message: &str) -> ApiReply {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message)))
}

struct RunningListener {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the loopback listener. Reconfiguration goes through `&mut self`,
/// so the owner serializes it.
pub struct CommandIngestionServer {
    port: u16,
    state: ServerState,
    listener: Option<RunningListener>,
    running: Arc<AtomicBool>,
}

impl CommandIngestionServer {
    pub fn new(port: u16, state: ServerState) -> BridgeResult<Self> {
        let port = validate_port(u32::from(port))?;
        Ok(Self {
            port,
            state,
            listener: None,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|l| l.local_addr)
    }

    pub fn token_configured(&self) -> bool {
        self.state.configured_token().is_some()
    }

    /// Applies a new token to subsequent requests without rebinding.
    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut current) = self.state.token.write() {
            *current = normalize_token(token);
        }
    }

    pub async fn start(&mut self) -> BridgeResult<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            warn!("Server already running on {}", addr);
            return Ok(addr);
        }
        info!("Starting HTTP server on {}:{}...", BIND_HOST, self.port);
        let addr = self.spawn_listener().await?;
        self.running.store(true, Ordering::SeqCst);
        info!("HTTP server started on {}", addr);
        Ok(addr)
    }

    pub async fn stop(&mut self) {
        if self.listener.is_none() {
            return;
        }
        info!("Stopping HTTP server...");
        self.shutdown_listener().await;
        self.running.store(false, Ordering::SeqCst);
        info!("HTTP server stopped");
    }

    /// Moves the listener to `port`, keeping the same state and the
    /// running flag. If the new bind fails the server ends up stopped.
    pub async fn set_port(&mut self, port: u16) -> BridgeResult<()> {
        if port == self.port {
            return Ok(());
        }
        let port = validate_port(u32::from(port))?;
        info!("Port changed {} -> {}", self.port, port);

        let was_running = self.listener.is_some();
        self.shutdown_listener().await;
        self.port = port;

        if was_running {
            if let Err(e) = self.spawn_listener().await {
                self.running.store(false, Ordering::SeqCst);
                error!("Failed to restart HTTP server: {}", e);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn spawn_listener(&mut self) -> BridgeResult<SocketAddr> {
        let listener = TcpListener::bind((BIND_HOST, self.port))
            .await
            .map_err(|source| BridgeError::Bind {
                port: self.port,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let app = build_router(self.state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                error!("HTTP server error: {}", e);
            }
        });

        self.listener = Some(RunningListener {
            local_addr,
            shutdown: shutdown_tx,
            task,
        });
        Ok(local_addr)
    }

    async fn shutdown_listener(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let _ = listener.shutdown.send(());
        let mut task = listener.task;
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!("HTTP server did not drain in time, aborting connections");
            task.abort();
        }
    }
}
