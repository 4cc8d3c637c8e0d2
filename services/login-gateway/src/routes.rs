//! HTTP surface of the login gateway
//!
//! Routes:
//! - `GET  /auth/github/login`    — start a login, 303 to GitHub
//! - `GET  /auth/github/callback` — complete a login, 303 home
//! - `POST /auth/github/logout`   — clear stored auth, 204
//! - `GET  /auth/session`         — current session snapshot as JSON
//! - `GET  /health`               — liveness
//! - `GET  /metrics`              — Prometheus text exposition

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Redirect, Response};
use axum::routing::{get, post};
use github_auth::{AuthSession, CallbackGuard, CallbackParams, Error};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{error, info, warn};

use crate::metrics;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<AuthSession>,
    pub guard: Arc<CallbackGuard>,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
    pub logins_started: Arc<AtomicU64>,
    pub exchanges_total: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        session: Arc<AuthSession>,
        guard: Arc<CallbackGuard>,
        prometheus: PrometheusHandle,
    ) -> Self {
        Self {
            session,
            guard,
            prometheus,
            started_at: Instant::now(),
            logins_started: Arc::new(AtomicU64::new(0)),
            exchanges_total: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/auth/github/login", get(login_handler))
        .route("/auth/github/callback", get(callback_handler))
        .route("/auth/github/logout", post(logout_handler))
        .route("/auth/session", get(session_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Start a login attempt and redirect the browser to GitHub.
async fn login_handler(State(state): State<AppState>) -> Response {
    match state.session.begin_login().await {
        Ok(url) => {
            metrics::record_login_started();
            state.logins_started.fetch_add(1, Ordering::Relaxed);
            Redirect::to(&url).into_response()
        }
        Err(e) => {
            error!(error = %e, "unable to start login");
            error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Sign-in unavailable",
                &e.to_string(),
            )
        }
    }
}

/// Complete a login attempt from GitHub's redirect.
///
/// Validates the query parameters, admits the delivery through the
/// duplicate guard, then runs the exchange. Success lands the browser
/// back at `/`; a superseded or duplicate delivery gets a neutral page
/// instead of an error, since the user did nothing wrong.
async fn callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let request_id = format!("auth_{}", uuid::Uuid::new_v4().as_simple());

    if let Some(message) = params.blocking_error() {
        warn!(%request_id, %message, "callback rejected");
        metrics::record_exchange("rejected", 0.0);
        return error_page(StatusCode::BAD_REQUEST, "Sign-in failed", &message);
    }

    let code = params.code.as_deref().unwrap_or_default();
    let callback_state = params.state.as_deref().unwrap_or_default();
    let key = params.attempt_key();

    let Some(cancel) = state.guard.begin(&key) else {
        info!(%request_id, "duplicate callback delivery ignored");
        return neutral_page("Sign-in already handled");
    };

    let started = Instant::now();
    let result = state
        .session
        .complete_login(code, callback_state, &cancel)
        .await;
    state.guard.finish(&key, result.is_ok());
    state.exchanges_total.fetch_add(1, Ordering::Relaxed);
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(()) => {
            metrics::record_exchange("success", elapsed);
            info!(%request_id, "login completed");
            Redirect::to("/").into_response()
        }
        Err(e) if e.is_cancelled() => {
            metrics::record_exchange("cancelled", elapsed);
            info!(%request_id, "login attempt superseded");
            neutral_page("Sign-in restarted")
        }
        Err(e) => {
            metrics::record_exchange("failure", elapsed);
            warn!(%request_id, error = %e, "login failed");
            let status = match e {
                Error::InvalidState | Error::MissingVerifier => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            };
            error_page(status, "Sign-in failed", &e.to_string())
        }
    }
}

/// Clear stored credentials and the in-memory session.
async fn logout_handler(State(state): State<AppState>) -> StatusCode {
    state.session.logout().await;
    StatusCode::NO_CONTENT
}

/// Current session snapshot for the UI.
async fn session_handler(State(state): State<AppState>) -> Response {
    Json(state.session.snapshot().await).into_response()
}

/// Liveness endpoint: status, auth state and uptime.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.session.snapshot().await;
    let body = serde_json::json!({
        "status": "healthy",
        "session_ready": snapshot.is_ready,
        "authenticated": snapshot.user.is_some(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "logins_started": state.logins_started.load(Ordering::Relaxed),
        "exchanges_total": state.exchanges_total.load(Ordering::Relaxed),
    });
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint — returns metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Escape text for interpolation into HTML. The error text can carry
/// provider-controlled input from the callback query string and upstream
/// response bodies; it is shown as text, never as markup.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn error_page(status: StatusCode, title: &str, message: &str) -> Response {
    let title = html_escape(title);
    let message = html_escape(message);
    let body = format!(
        "<!doctype html><html><head><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{message}</p>\
         <p><a href=\"/\">Back to home</a></p></body></html>"
    );
    (status, Html(body)).into_response()
}

fn neutral_page(message: &str) -> Response {
    let message = html_escape(message);
    let body = format!(
        "<!doctype html><html><head><title>GitHub sign-in</title></head>\
         <body><p>{message}</p><p><a href=\"/\">Back to home</a></p></body></html>"
    );
    (StatusCode::OK, Html(body)).into_response()
}
