//! 横幅、健康探针与指标接口

use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use super::error::ApiError;
use crate::health::HealthStatus;
use crate::AppState;

/// GET /
pub async fn index() -> Json<Value> {
    Json(json!({ "message": "TenantDB API is running!" }))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Response {
    let result = state.health.latest().await;
    let status = match result.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(result)).into_response()
}

/// GET /ready
pub async fn ready(State(state): State<AppState>) -> StatusCode {
    match state.health.latest().await.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(([(CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response())
}
