//! `GatewayServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use hydrate_core::{Clock, SystemClock};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_REJECTED_TOTAL;
use crate::registry::SessionRegistry;
use crate::scheduler::{BroadcastScheduler, LastFired};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{ConnectionHandler, ConnectionOptions, WsTransport};

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live sessions.
    pub registry: Arc<SessionRegistry>,
    /// Time source for replies.
    pub clock: Arc<dyn Clock>,
    /// Shutdown coordinator.
    pub shutdown: ShutdownCoordinator,
    /// Per-connection knobs.
    pub connection: ConnectionOptions,
    /// Upgrades are refused at this many live sessions.
    pub max_connections: usize,
    /// Max inbound message size in bytes.
    pub max_message_size: usize,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The gateway server.
pub struct GatewayServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    clock: Arc<dyn Clock>,
    shutdown: ShutdownCoordinator,
    last_fired: LastFired,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl GatewayServer {
    /// Create a server on the system clock.
    pub fn new(config: ServerConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            config,
            registry: Arc::new(SessionRegistry::with_clock(Arc::clone(&clock))),
            clock,
            shutdown: ShutdownCoordinator::new(),
            last_fired: LastFired::new(),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Use a different time source for replies, activity stamps and the
    /// scheduler.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.registry = Arc::new(SessionRegistry::with_clock(Arc::clone(&clock)));
        self.clock = clock;
        self
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            clock: Arc::clone(&self.clock),
            shutdown: self.shutdown.clone(),
            connection: ConnectionOptions::from(&self.config),
            max_connections: self.config.max_connections,
            max_message_size: self.config.max_message_size,
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/", get(index_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// A scheduler over this server's registry and clock.
    ///
    /// Every scheduler handed out, including the one [`Self::listen`] spawns,
    /// shares this server's fired-minute guard, so a minute goes out once no
    /// matter how many of them tick.
    pub fn scheduler(&self) -> BroadcastScheduler {
        BroadcastScheduler::with_guard(
            Arc::clone(&self.registry),
            Arc::clone(&self.clock),
            self.last_fired.clone(),
        )
    }

    /// Bind, start serving and start the scheduler.
    pub async fn listen(&self) -> std::io::Result<ServerHandle> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let server = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "http server failed");
            }
        });

        let scheduler = self.config.scheduler_enabled.then(|| {
            self.scheduler()
                .spawn(self.config.tick_interval, self.shutdown.token())
        });

        info!(%addr, scheduler = self.config.scheduler_enabled, "gateway listening");
        Ok(ServerHandle {
            addr,
            server,
            scheduler,
        })
    }

    /// The session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Background tasks of a listening server.
pub struct ServerHandle {
    addr: SocketAddr,
    server: JoinHandle<()>,
    scheduler: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// The bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Task handles to wait on during shutdown.
    pub fn into_tasks(self) -> Vec<JoinHandle<()>> {
        std::iter::once(self.server).chain(self.scheduler).collect()
    }
}

/// GET /
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let live = state.registry.len();
    if live >= state.max_connections {
        counter!(WS_REJECTED_TOTAL).increment(1);
        warn!(live, max = state.max_connections, "connection limit reached, refusing upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| run_connection(socket, state))
}

async fn run_connection(socket: WebSocket, state: AppState) {
    let handler = ConnectionHandler::new(
        WsTransport::new(socket),
        state.registry,
        state.clock,
        state.connection,
        state.shutdown.token(),
    );
    let _ = state.shutdown.track(handler.run()).await;
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.registry.len()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use hydrate_core::{ManualClock, SessionId};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    use crate::registry::Session;
    use crate::websocket::Outbound;

    fn make_server() -> GatewayServer {
        GatewayServer::new(ServerConfig::default())
    }

    async fn get(app: Router, uri: &str) -> Response {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app.oneshot(req).await.unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[test]
    fn accessors() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert!(server.registry().is_empty());
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn index_serves_chat_page() {
        let resp = get(make_server().router(), "/").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let ct = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_owned();
        assert!(ct.starts_with("text/html"));
        let body = body_string(resp).await;
        assert!(body.contains("<html"));
        assert!(body.contains("/ws"));
    }

    #[tokio::test]
    async fn health_reports_live_sessions() {
        let server = make_server();
        let resp = get(server.router(), "/health").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);

        let (outbound, _rx) = Outbound::channel(1);
        let _ = server
            .registry()
            .register(Session::new(SessionId::new(), chrono::Local::now().naive_local(), &outbound))
            .unwrap();
        let resp = get(server.router(), "/health").await;
        let parsed: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(parsed["connections"], 1);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        let resp = get(make_server().router(), "/metrics").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_recorder_renders_text() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let resp = get(make_server().with_metrics(handle).router(), "/metrics").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let ct = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_owned();
        assert!(ct.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn ws_without_upgrade_is_rejected() {
        let resp = get(make_server().router(), "/ws").await;
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let resp = get(make_server().router(), "/nonexistent").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let req = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://example.com")
            .body(Body::empty())
            .unwrap();
        let resp = make_server().router().oneshot(req).await.unwrap();
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[test]
    fn with_clock_drives_scheduler() {
        let clock = Arc::new(ManualClock::at(14, 2, 0).unwrap());
        let server = make_server().with_clock(clock);
        let scheduler = server.scheduler();
        assert!(matches!(
            scheduler.tick(),
            crate::TickOutcome::Fired { recipients: 0, .. }
        ));
    }

    #[test]
    fn schedulers_from_one_server_fire_each_minute_once() {
        let clock = Arc::new(ManualClock::at(14, 2, 0).unwrap());
        let server = make_server().with_clock(clock.clone());
        let (outbound, mut rx) = Outbound::channel(8);
        let _ = server
            .registry()
            .register(Session::new(SessionId::new(), clock.now(), &outbound))
            .unwrap();

        let first = server.scheduler();
        let second = server.scheduler();
        assert!(matches!(
            first.tick(),
            crate::TickOutcome::Fired { delivered: 1, .. }
        ));
        assert_eq!(second.tick(), crate::TickOutcome::AlreadyFired);
        assert_eq!(server.scheduler().tick(), crate::TickOutcome::AlreadyFired);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn listen_binds_and_shuts_down() {
        let config = ServerConfig {
            scheduler_enabled: false,
            ..ServerConfig::default()
        };
        let server = GatewayServer::new(config);
        let handle = server.listen().await.unwrap();
        assert_ne!(handle.addr().port(), 0);

        let tasks = handle.into_tasks();
        assert_eq!(tasks.len(), 1);
        assert!(server.shutdown().graceful_shutdown(tasks, None).await);
    }
}
