//! `PageSyncServer`: Axum HTTP + WebSocket surface around one [`Engine`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use pagesync_engine::Engine;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::client::{self, ClientRegistry};
use crate::config::{ConfigError, ServerConfig};
use crate::connection::{self, ConnectionSettings};
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub clients: Arc<ClientRegistry>,
    pub shutdown: ShutdownCoordinator,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
    pub settings: ConnectionSettings,
    pub max_message_size: usize,
}

/// Build the Axum router: the namespace upgrade route, `/health` and `/metrics`.
pub fn build_router(namespace: &str, state: AppState) -> Router {
    Router::new()
        .route(namespace, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Why [`PageSyncServer::start`] failed.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// A configured server whose engine is still open for registration.
///
/// ```ignore
/// let mut server = PageSyncServer::new(config);
/// server.engine_mut().page(bundle);
/// let handle = server.start(None).await?;
/// ```
pub struct PageSyncServer {
    config: ServerConfig,
    clients: Arc<ClientRegistry>,
    engine: Engine,
}

impl PageSyncServer {
    pub fn new(config: ServerConfig) -> Self {
        let clients = Arc::new(ClientRegistry::new(
            config.max_send_queue,
            Duration::from_secs(config.client_timeout_secs),
        ));
        let engine = Engine::new(clients.clone());
        Self {
            config,
            clients,
            engine,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Register pages and auth predicates before starting.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Validate the config, bind the listener and spawn the serve and cleanup tasks.
    pub async fn start(self, metrics: Option<PrometheusHandle>) -> Result<ServerHandle, StartError> {
        self.config.validate()?;
        let Self {
            config,
            clients,
            engine,
        } = self;
        let engine = Arc::new(engine);
        let shutdown = ShutdownCoordinator::new();
        let drain_timeout = Duration::from_secs(config.drain_timeout_secs);

        let cleanup = client::start_cleanup_task(
            Arc::clone(&clients),
            Duration::from_secs(config.heartbeat_interval_secs),
            shutdown.token(),
        );

        let state = AppState {
            engine: Arc::clone(&engine),
            clients: Arc::clone(&clients),
            shutdown: shutdown.clone(),
            start_time: Instant::now(),
            metrics,
            settings: ConnectionSettings {
                heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
                dispatch_queue: config.dispatch_queue,
                drain_timeout,
            },
            max_message_size: config.max_message_size,
        };
        let router = build_router(&config.namespace, state);

        let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            namespace = %config.namespace,
            pages = engine.registry().count(),
            auth = !engine.auth_gate().is_empty(),
            "pagesync server started"
        );

        let token = shutdown.token();
        let server = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(err) = serve.await {
                tracing::error!(error = %err, "server error");
            }
        });

        Ok(ServerHandle {
            addr: local_addr,
            namespace: config.namespace,
            engine,
            clients,
            shutdown,
            drain_timeout,
            tasks: vec![server, cleanup],
        })
    }
}

/// Handle returned by [`PageSyncServer::start`]; keeps background tasks alive.
pub struct ServerHandle {
    addr: SocketAddr,
    namespace: String,
    engine: Arc<Engine>,
    clients: Arc<ClientRegistry>,
    shutdown: ShutdownCoordinator,
    drain_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// `ws://` URL of the namespace.
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.addr, self.namespace)
    }

    /// The running engine, for root-level commits from outside any handler.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn connection_count(&self) -> usize {
        self.clients.count()
    }

    /// Stop accepting upgrades, close open connections once their dispatch
    /// queues drain, then stop the listener and cleanup tasks.
    ///
    /// `timeout` defaults to the drain timeout plus the writer's close grace.
    /// Returns `false` if it expired first.
    pub async fn shutdown(self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(self.drain_timeout + Duration::from_secs(2));
        self.shutdown.drain(self.tasks, timeout).await
    }
}

/// `GET <namespace>`: upgrade and run one connection.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let max = state.max_message_size;
    ws.max_message_size(max)
        .on_upgrade(move |socket| {
            let shutdown = state.shutdown.clone();
            shutdown.track_connection(handle_socket(socket, state))
        })
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (session_id, rx) = state.clients.register();
    connection::handle_ws_connection(
        socket,
        session_id,
        rx,
        state.clients,
        state.engine,
        state.settings,
        state.shutdown.token(),
    )
    .await;
}

/// `GET /health`
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.clients.count(),
        state.engine.registry().count(),
    ))
}

/// `GET /metrics`
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
