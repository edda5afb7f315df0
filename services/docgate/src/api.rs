//! HTTP surface
//!
//! - `POST /convert/{tool}`: body is the input document, `content-type` its
//!   media type; optional `x-file-name` and `x-output-format` headers
//! - `GET /status`: per-provider pool, limiter and token cache counts
//! - `GET /health`: 200 when conversions can be served, 503 when degraded
//! - `GET /metrics`: Prometheus text exposition

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use provider::{Artifact, ConversionRequest, Tool};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::error::{ApiError, error_response, request_id};
use crate::gateway::Gateway;
use crate::local::is_valid_format;

pub const FILE_NAME_HEADER: &str = "x-file-name";
pub const OUTPUT_FORMAT_HEADER: &str = "x-output-format";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Where credential env entries are read from on reload.
pub type CredentialSource = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub config: Arc<Config>,
    pub credentials: CredentialSource,
    pub prometheus: PrometheusHandle,
    /// Cancelled when the drain timeout runs out; aborts in-flight jobs
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

/// Build the public router.
///
/// `max_connections` bounds concurrent requests; uploads beyond
/// `max_upload_bytes` are refused with 413.
pub fn build_router(state: AppState, max_connections: usize, max_upload_bytes: usize) -> Router {
    Router::new()
        .route(
            "/convert/{tool}",
            post(convert_handler).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn conversion_request(
    state: &AppState,
    tool: Tool,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<ConversionRequest, ApiError> {
    let body = body.map_err(|rejection| match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::BodyTooLarge {
            limit: state.config.server.max_upload_bytes,
        },
        _ => ApiError::InvalidBody(rejection.body_text()),
    })?;
    if body.is_empty() {
        return Err(ApiError::EmptyBody);
    }

    let media_type =
        header_str(headers, header::CONTENT_TYPE.as_str()).unwrap_or("application/octet-stream");
    let mut input = Artifact::new(body, media_type);
    if let Some(name) = header_str(headers, FILE_NAME_HEADER) {
        input = input.with_file_name(name);
    }

    let mut request = ConversionRequest::new(tool, input);
    let requested = header_str(headers, OUTPUT_FORMAT_HEADER);
    if let Some(format) = requested
        && !is_valid_format(format)
    {
        return Err(ApiError::InvalidBody(format!(
            "{OUTPUT_FORMAT_HEADER} must be a short alphanumeric extension"
        )));
    }
    let format = requested.or(state.gateway.default_format(tool));
    if let Some(format) = format {
        request = request.with_output_format(format);
    }
    Ok(request)
}

/// POST /convert/{tool}
#[instrument(skip_all, fields(request_id = tracing::field::Empty, tool = %tool_name))]
async fn convert_handler(
    State(state): State<AppState>,
    Path(tool_name): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let request_id = request_id();
    tracing::Span::current().record("request_id", request_id.as_str());

    let tool = match tool_name.parse::<Tool>() {
        Ok(tool) => tool,
        Err(_) => return ApiError::UnknownTool(tool_name).into_response_with(&request_id),
    };

    let started = Instant::now();
    let result = match conversion_request(&state, tool, &headers, body) {
        Ok(request) => {
            let cancel = state.shutdown.child_token();
            state
                .gateway
                .router
                .convert_with_cancel(&request, &cancel)
                .await
                .map_err(ApiError::from)
        }
        Err(err) => Err(err),
    };
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(artifact) => {
            crate::metrics::record_conversion(tool.as_str(), "ok", elapsed);
            info!(bytes = artifact.len(), elapsed_secs = elapsed, "conversion complete");
            artifact_response(artifact, &request_id)
        }
        Err(err) => {
            crate::metrics::record_conversion(tool.as_str(), err.kind(), elapsed);
            warn!(error = %err, kind = err.kind(), "conversion failed");
            err.into_response_with(&request_id)
        }
    }
}

fn artifact_response(artifact: Artifact, request_id: &str) -> Response {
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact.media_type.as_str())
        .header(REQUEST_ID_HEADER, request_id);
    if let Some(name) = &artifact.file_name {
        let disposition = format!("attachment; filename=\"{}\"", name.replace(['"', '\\'], "_"));
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            response = response.header(header::CONTENT_DISPOSITION, value);
        }
    }
    response
        .body(Body::from(artifact.bytes))
        .unwrap_or_else(|e| {
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                &format!("response build error: {e}"),
                request_id,
            )
        })
}

/// GET /status
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let providers = state.gateway.router.status().await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::to_string(&providers).unwrap_or_else(|_| String::from("[]")),
    )
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.gateway.router.health().await;
    let status_code = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = serde_json::json!({
        "status": health.status,
        "providers": health.providers,
        "local_tools": health.local_tools,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });
    (
        status_code,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}
