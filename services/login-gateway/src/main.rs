//! GitHub Login Gateway
//!
//! Single-binary Rust service that:
//! 1. Starts GitHub OAuth logins with PKCE and redirects the browser
//! 2. Completes the callback via a token-exchange proxy
//! 3. Persists the token and user identity locally
//! 4. Serves the session snapshot to the UI

mod config;
mod metrics;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use github_auth::{AuthConfig, AuthSession, AuthStorage, CallbackGuard};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::routes::AppState;

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

    info!("starting github-login-gateway");

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

    info!(
        listen_addr = %config.server.listen_addr,
        redirect_uri = %config.github.redirect_uri,
        proxy_url = %config.exchange.proxy_url,
        state_dir = %config.storage.state_dir.display(),
        "configuration loaded"
    );

    let storage = AuthStorage::open(&config.storage.state_dir).with_context(|| {
        format!(
            "failed to open state dir {}",
            config.storage.state_dir.display()
        )
    })?;

    let auth_config = AuthConfig {
        client_id: config.github.client_id.clone(),
        redirect_uri: config.github.redirect_uri.clone(),
        scopes: config.github.scopes.clone(),
        proxy_url: config.exchange.proxy_url.clone(),
        user_endpoint: config.exchange.user_endpoint.clone(),
        default_token_ttl: Duration::from_secs(config.exchange.default_token_ttl_secs),
    };

    let session = Arc::new(AuthSession::new(
        auth_config,
        storage,
        reqwest::Client::new(),
    ));

    // Rehydrate from storage before accepting requests, so the first
    // /auth/session response already reflects a previous login
    session.bootstrap(&CancellationToken::new()).await;

    let app_state = AppState::new(session, Arc::new(CallbackGuard::new()), prometheus_handle);

    let app = routes::build_router(app_state, config.server.max_connections);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;

    info!(addr = %config.server.listen_addr, "accepting requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
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
