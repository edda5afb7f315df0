//! docgate
//!
//! Document conversion gateway:
//! 1. Loads provider, tool and server settings from TOML
//! 2. Reads provider credentials from indexed env entries
//! 3. Serves `POST /convert/{tool}`, walking each tool's provider chain
//!    with credential rotation and ending at a local converter
//! 4. Exposes status, health, Prometheus metrics and a reload endpoint

mod admin;
mod api;
mod config;
mod error;
mod gateway;
mod local;
mod metrics;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::{AppState, CredentialSource};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filter from LOG_LEVEL / RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting docgate");

    // Install before anything emits
    let prometheus =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

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

    info!(
        listen_addr = %config.server.listen_addr,
        providers = config.providers.len(),
        tools = config.tools.len(),
        "configuration loaded"
    );

    let credentials: CredentialSource = Arc::new(|key: &str| std::env::var(key).ok());
    let accounts = config
        .load_credentials_with(|key| credentials(key))
        .context("failed to load provider credentials")?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("docgate/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    let gateway = gateway::build(&config, accounts, client).context("failed to build gateway")?;

    let shutdown = CancellationToken::new();
    let sweep = docgate_pool::spawn_sweep_task(
        gateway.pools.clone(),
        config.gateway.sweep_interval(),
        shutdown.clone(),
    );

    let health = gateway.router.health().await;
    if !health.is_healthy() {
        warn!("no provider has credentials and not every tool has a local converter");
    }

    let config = Arc::new(config);
    let state = AppState {
        gateway: Arc::new(gateway),
        config: config.clone(),
        credentials,
        prometheus,
        shutdown: shutdown.clone(),
        started_at: Instant::now(),
    };

    let server = &config.server;
    let app = api::build_router(state.clone(), server.max_connections, server.max_upload_bytes);

    let admin_addr = server.admin_listen_addr;
    let admin_listener = TcpListener::bind(admin_addr)
        .await
        .with_context(|| format!("failed to bind admin listener to {admin_addr}"))?;
    info!(addr = %admin_addr, "admin API listening");

    let listener = TcpListener::bind(server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", server.listen_addr))?;
    info!(addr = %server.listen_addr, "accepting requests");

    // Drain timeout starts at signal receipt: notify the servers, then race
    // the drain against the timer.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let server_handle = tokio::spawn(serve(listener, app, shutdown_rx.clone()));
    let admin_handle = tokio::spawn(serve(
        admin_listener,
        admin::build_admin_router(state),
        shutdown_rx,
    ));

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    let drain_timeout = Duration::from_secs(server.drain_timeout_secs);
    match tokio::time::timeout(drain_timeout, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = drain_timeout.as_secs(),
            "drain timeout exceeded, cancelling in-flight conversions"
        ),
    }

    // Aborts polling jobs still running and stops the sweep
    shutdown.cancel();
    admin_handle.abort();
    if let Err(e) = sweep.await {
        error!(error = %e, "sweep task panicked");
    }

    info!("shutdown complete");
    Ok(())
}

async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

/// Wait for SIGTERM or SIGINT.
///
/// If a handler cannot be installed the other one still works; with neither
/// the process runs until killed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{test_config, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn state() -> AppState {
        let config = test_config();
        let built = gateway::build(&config, HashMap::new(), reqwest::Client::new()).unwrap();
        test_state(built)
    }

    fn public_app() -> Router {
        api::build_router(state(), 8, 1024)
    }

    #[tokio::test]
    async fn public_router_does_not_expose_admin_routes() {
        for request in [
            Request::post("/admin/reload").body(Body::empty()).unwrap(),
            Request::get("/admin/pools").body(Body::empty()).unwrap(),
        ] {
            let response = public_app().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn admin_router_serves_reload() {
        let response = admin::build_admin_router(state())
            .oneshot(Request::post("/admin/reload").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn server_drains_on_shutdown_notification() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(serve(listener, public_app(), rx));

        let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server must stop after shutdown notification");
        assert!(result.unwrap().is_ok());
    }
}
