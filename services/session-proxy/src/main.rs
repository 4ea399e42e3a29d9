//! Session Proxy
//!
//! Single-binary sidecar that:
//! 1. Loads the session token pair from a credentials file
//! 2. Listens for plain HTTP requests from local callers
//! 3. Forwards them to the API with `Authorization: Bearer <access>` attached
//! 4. Refreshes the pair and retries once when the API answers 401
//! 5. Clears the session and reports `login_required` when refresh fails
//!
//! A second listener serves the session admin API (login, logout, status).

mod admin;
mod config;
mod metrics;
mod proxy;
mod session;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;
use session_auth::{CredentialStore, FileCredentialStore, HttpTokenRefresher};
use session_pipeline::{AuthPipeline, RefreshMode, SessionEvents, spawn_navigation_task};
use transport::HttpTransport;

use crate::admin::{AdminState, build_admin_router};
use crate::config::Config;
use crate::proxy::ProxyState;
use crate::session::{LoginNavigator, SessionStatus};

/// How long in-flight requests get to finish once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    proxy: ProxyState,
    status: Arc<SessionStatus>,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(proxy_handler)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting session-proxy");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let refresh_url = config.refresh_url();
    let mode = if config.session.coalesce_refresh {
        RefreshMode::SingleFlight
    } else {
        RefreshMode::Independent
    };

    info!(
        listen_addr = %config.proxy.listen_addr,
        admin_addr = %config.proxy.admin_addr,
        base_url = %config.proxy.base_url,
        refresh_url = %refresh_url,
        timeout_ms = config.proxy.timeout_ms,
        ?mode,
        "configuration loaded"
    );

    let store: Arc<dyn CredentialStore> = Arc::new(
        FileCredentialStore::load(config.session.credentials_path.clone())
            .await
            .with_context(|| {
                format!(
                    "failed to load credentials from {}",
                    config.session.credentials_path.display()
                )
            })?,
    );

    let client = reqwest::Client::new();
    let transport = Arc::new(HttpTransport::new(client.clone(), config.timeout()));
    let refresher = Arc::new(HttpTokenRefresher::new(
        client,
        refresh_url,
        config.timeout(),
        store.clone(),
    ));

    let events = SessionEvents::new();
    let status = Arc::new(SessionStatus::from_store(store.as_ref()).await);
    let _navigation = spawn_navigation_task(
        &events,
        Arc::new(LoginNavigator::new(
            status.clone(),
            config.session.login_url.clone(),
        )),
        store.clone(),
    );

    let pipeline = Arc::new(AuthPipeline::new(store, transport, refresher, events, mode));

    let app_state = AppState {
        proxy: ProxyState {
            pipeline: pipeline.clone(),
            base_url: config.proxy.base_url.clone(),
        },
        status: status.clone(),
        started_at: Instant::now(),
        prometheus: prometheus_handle,
    };
    let app = build_router(app_state, config.proxy.max_connections);
    let admin_app = build_admin_router(AdminState::new(
        pipeline,
        status.clone(),
        config.session.login_url.clone(),
    ));

    let listener = TcpListener::bind(config.proxy.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.proxy.listen_addr))?;
    let admin_listener = TcpListener::bind(config.proxy.admin_addr)
        .await
        .with_context(|| format!("failed to bind admin to {}", config.proxy.admin_addr))?;

    info!(
        addr = %config.proxy.listen_addr,
        admin_addr = %config.proxy.admin_addr,
        session = ?status.state(),
        "accepting requests"
    );

    // The drain timeout starts when the shutdown signal fires, not when the
    // servers start: notify both servers to drain, then race the drain
    // against the timeout.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server_handle = tokio::spawn(serve(listener, app, shutdown_rx.clone()));
    let admin_handle = tokio::spawn(serve(admin_listener, admin_app, shutdown_rx));

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    let drained = async {
        let (proxy, admin) = tokio::join!(server_handle, admin_handle);
        for (name, result) in [("proxy", proxy), ("admin", admin)] {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(server = name, error = %e, "server error during shutdown"),
                Err(e) => error!(server = name, error = %e, "server task panicked"),
            }
        }
    };

    match tokio::time::timeout(DRAIN_TIMEOUT, drained).await {
        Ok(()) => info!("all in-flight requests drained"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

/// Health endpoint: process liveness plus the session state. A session that
/// needs login does not make the proxy unhealthy.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "session": state.status.state(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint: returns metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Catch-all handler that proxies all non-health requests to upstream.
async fn proxy_handler(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    proxy::proxy_request(&state.proxy, request, request_id).await
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
