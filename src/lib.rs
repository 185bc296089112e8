//! Core library for the MedPanel gateway. This module wires together the
//! request types, the shared application state and the HTTP handlers that
//! sit in front of the diagnostic panel engine.
//!
//! A request flows through [`normalize`](crate::normalize), the
//! [`AnalysisGateway`], report [`repair`](crate::report) and
//! [`assemble`](crate::response::assemble). Any failure is classified once
//! by [`AnalyzeError`]'s `IntoResponse` implementation.

mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod report;
pub mod response;

pub use config::AppConfig;
pub use engine::{AnalysisGateway, AnalysisResult, EngineFailure, PanelEngine};
pub use error::{AnalyzeError, ErrorResponse};
pub use normalize::{ClinicalRequest, Mode};
pub use report::Report;
pub use response::{ApiResponse, Summary};

use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody, JsonRejection},
    DefaultBodyLimit, State,
};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::metrics::Metrics;
use crate::report::repair_with_outcome;

/// Body of `POST /analyze`. Everything is optional at the wire level so
/// that missing fields surface as classified validation errors instead of
/// extractor rejections.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct AnalyzeRequest {
    pub notes: Option<String>,
    /// Raw base64 or a `data:<mime>;base64,<payload>` URL.
    pub image: Option<String>,
    pub mode: Option<String>,
}

/// Internal application state shared across handlers. The engine handle
/// inside the gateway is built once and never mutated afterwards.
#[derive(Clone)]
pub struct AppState {
    pub gateway: AnalysisGateway,
    pub metrics: Arc<Metrics>,
    pub max_request_bytes: usize,
    pub max_image_pixels: u64,
    pub cors_origin: String,
    /// Log each report's repair outcome at info level.
    pub log_reports: bool,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Build state around an already-initialized engine. Tests use this to
/// substitute a fake engine.
pub fn build_state(config: &AppConfig, engine: Arc<dyn PanelEngine>) -> AppState {
    AppState {
        gateway: AnalysisGateway::new(engine, Duration::from_millis(config.engine_timeout_ms)),
        metrics: Arc::new(Metrics::new()),
        max_request_bytes: config.max_request_bytes,
        max_image_pixels: config.max_image_pixels,
        cors_origin: config.cors_origin.clone(),
        log_reports: config.log_reports,
        started_at: chrono::Utc::now(),
    }
}

/// Build state from environment variables. This function reads the
/// following variables:
///
/// * `HF_TOKEN` (optional) – engine credential; without it `/analyze` fails.
/// * `MEDPANEL_ENGINE_URL` (optional) – remote panel engine endpoint.
/// * `MEDPANEL_ENGINE_TIMEOUT_MS` (optional) – bound on one engine call.
/// * `MEDPANEL_MAX_REQUEST_BYTES` (optional) – request body limit.
/// * `MEDPANEL_MAX_IMAGE_PIXELS` (optional) – largest accepted raster.
/// * `MEDPANEL_CORS_ORIGIN` (optional) – allowed CORS origin, default `*`.
pub async fn build_state_from_env() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env()?;
    Ok(build_state_from_config(&config))
}

/// Initialize the engine named by `config` and build state around it.
pub fn build_state_from_config(config: &AppConfig) -> AppState {
    let engine = engine::initialize(
        config.engine_credential.as_deref(),
        config.engine_url.as_deref(),
    );
    build_state(config, engine)
}

/// Build the Axum router and attach handlers. The router holds a copy
/// of the `AppState` for each invocation.
pub fn app(state: AppState) -> Router {
    let origin = HeaderValue::from_str(&state.cors_origin).unwrap_or_else(|_| {
        tracing::warn!(origin = %state.cors_origin, "invalid CORS origin, falling back to *");
        HeaderValue::from_static("*")
    });

    Router::new()
        .route("/", get(info_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/analyze", post(analyze_handler).options(preflight_handler))
        .fallback(fallback_handler)
        .layer(DefaultBodyLimit::max(state.max_request_bytes))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            origin,
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Authorization"),
        ))
        .with_state(state)
}

/// Handler for `POST /analyze`. Records latency and outcome, then answers
/// with the success envelope or the classified error.
async fn analyze_handler(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> axum::response::Response {
    let start = Instant::now();
    let result = run_analysis(&state, payload).await;
    state
        .metrics
        .record_request(start.elapsed().as_millis() as u64);
    match result {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => {
            state.metrics.record_error(err.kind());
            err.into_response()
        }
    }
}

async fn run_analysis(
    state: &AppState,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<ApiResponse, AnalyzeError> {
    let Json(payload) =
        payload.map_err(|rejection| classify_rejection(rejection, state.max_request_bytes))?;

    let max_pixels = state.max_image_pixels;
    let request = tokio::task::spawn_blocking(move || normalize::normalize(&payload, max_pixels))
        .await
        .map_err(|err| AnalyzeError::Internal(format!("normalization task failed: {err}")))??;
    tracing::info!(
        mode = request.mode.as_str(),
        image = request.image_analyzed(),
        notes_len = request.notes.len(),
        "analysis request"
    );

    let result = state.gateway.run(&request).await?;

    let (report, outcome) = repair_with_outcome(result.final_report);
    state.metrics.record_report(outcome);
    if state.log_reports {
        tracing::info!(outcome = outcome.as_str(), trace_len = result.panel_trace.len(), "report ready");
    }

    Ok(response::assemble(
        request.mode,
        request.image_analyzed(),
        report,
        result.panel_trace,
    ))
}

fn classify_rejection(rejection: JsonRejection, limit: usize) -> AnalyzeError {
    match rejection {
        JsonRejection::BytesRejection(BytesRejection::FailedToBufferBody(
            FailedToBufferBody::LengthLimitError(_),
        )) => AnalyzeError::PayloadTooLarge { limit },
        JsonRejection::MissingJsonContentType(_) => {
            AnalyzeError::InvalidBody("Content-Type must be application/json".into())
        }
        other => {
            tracing::debug!(detail = %other.body_text(), "json body rejected");
            AnalyzeError::InvalidBody("Invalid JSON body".into())
        }
    }
}

/// CORS preflight for `/analyze`.
async fn preflight_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn fallback_handler() -> axum::response::Response {
    error::not_found()
}

/// Service description for humans poking at the root URL.
async fn info_handler() -> axum::response::Response {
    let json = serde_json::json!({
        "service": "MedPanel API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "metrics": "/metrics",
            "analyze": "/analyze (POST)",
        },
    });
    (StatusCode::OK, Json(json)).into_response()
}

/// Simple health endpoint for container readiness / liveness checks.
/// Reports healthy even without an engine credential; `engine_ready` tells
/// the two apart.
async fn health_handler(State(state): State<AppState>) -> axum::response::Response {
    let json = serde_json::json!({
        "status": "healthy",
        "service": "MedPanel API",
        "engine": state.gateway.engine_name(),
        "engine_ready": state.gateway.is_ready(),
        "started_at": state.started_at.to_rfc3339(),
    });
    (StatusCode::OK, Json(json)).into_response()
}

/// Prometheus-style metrics exposition.
async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}
