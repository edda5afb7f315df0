//! Admin API for credential management
//!
//! Runs on its own listener (`admin_listen_addr`, loopback 9090 by default)
//! and is never merged into the public router. Reach it via port-forward.
//!
//! Endpoints:
//! - POST /admin/reload  re-read credential env entries, reset pools, drop cached tokens
//! - GET  /admin/pools   per-credential pool health (labels only, never secrets)

use std::collections::BTreeMap;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tracing::{info, warn};

use crate::api::AppState;
use crate::error::{ApiError, request_id};

pub fn build_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/reload", post(reload))
        .route("/admin/pools", get(pools))
        .with_state(state)
}

/// POST /admin/reload
///
/// A malformed env entry aborts the reload before any pool is touched.
async fn reload(State(state): State<AppState>) -> Response {
    let source = state.credentials.clone();
    let credentials = match state.config.load_credentials_with(|key| source(key)) {
        Ok(credentials) => credentials,
        Err(err) => {
            warn!(error = %err, "credential reload rejected");
            return ApiError::from(err).into_response_with(&request_id());
        }
    };

    let counts: BTreeMap<String, usize> = credentials
        .iter()
        .map(|(id, accounts)| (id.clone(), accounts.len()))
        .collect();
    state.gateway.router.reload(credentials).await;
    info!(?counts, "credentials reloaded via admin API");

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::json!({ "reloaded": counts }).to_string(),
    )
        .into_response()
}

/// GET /admin/pools
async fn pools(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.gateway.router.health().await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::json!({ "pools": health.providers }).to_string(),
    )
}
