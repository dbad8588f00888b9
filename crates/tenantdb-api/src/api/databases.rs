//! 数据库接口
//!
//! 创建、删除、状态、详情、凭据与租户集群列表。

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info};

use tenantdb_common::{ClusterStatus, Error, TenantClusters};

use super::error::ApiError;
use super::outcome;
use crate::AppState;

/// 创建请求
#[derive(Debug, Deserialize)]
pub struct CreateDatabaseRequest {
    pub username: String,
    /// 未提供时为 `<username>-db`
    #[serde(default)]
    pub db_name: Option<String>,
    /// 未提供或为 0 时为 1
    #[serde(default)]
    pub replicas: Option<i32>,
}

/// 删除请求
#[derive(Debug, Deserialize)]
pub struct DeleteDatabaseRequest {
    pub username: String,
    pub db_name: String,
}

/// POST /databases
pub async fn create_database(
    State(state): State<AppState>,
    payload: Result<Json<CreateDatabaseRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    info!(username = %request.username, db_name = ?request.db_name, "收到创建请求");

    let (cancel, _guard) = state.request_token();
    let started = Instant::now();
    let result = state
        .service
        .create(
            &request.username,
            request.db_name.as_deref(),
            request.replicas,
            &cancel,
        )
        .await;
    state.metrics.record("create", outcome(&result));

    let created = result?;
    state
        .metrics
        .observe_provision(started.elapsed().as_secs_f64());

    Ok(Json(json!({
        "message": "Database provisioned successfully",
        "namespace": created.namespace,
        "db_name": created.db_name,
        "credentials": created.credentials,
    })))
}

/// DELETE /databases
pub async fn delete_database(
    State(state): State<AppState>,
    payload: Result<Json<DeleteDatabaseRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    info!(username = %request.username, db_name = %request.db_name, "收到删除请求");

    let (cancel, _guard) = state.request_token();
    let result = state
        .service
        .delete(&request.username, &request.db_name, &cancel)
        .await;
    state.metrics.record("delete", outcome(&result));
    result?;

    Ok(Json(json!({
        "message": "Database deleted successfully",
        "namespace": tenantdb_common::naming::tenant_namespace(&request.username),
        "db_name": request.db_name,
    })))
}

/// GET /databases/:username/:db_name/status
pub async fn database_status(
    State(state): State<AppState>,
    Path((username, db_name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let result = state.service.status(&username, &db_name).await;
    state.metrics.record("status", outcome(&result));
    let snapshot = result?;

    Ok(Json(json!({
        "db_name": db_name,
        "status": snapshot.status,
        "username": username,
    })))
}

/// GET /databases/:username/:db_name
pub async fn database_details(
    State(state): State<AppState>,
    Path((username, db_name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let result = state.service.status(&username, &db_name).await;
    state.metrics.record("details", outcome(&result));
    let snapshot = result?;

    if snapshot.status == ClusterStatus::NotFound {
        return Err(ApiError::not_found(snapshot.detail));
    }

    Ok(Json(json!({
        "username": username,
        "cluster": snapshot,
    })))
}

/// GET /databases/:username/:db_name/credentials
pub async fn database_credentials(
    State(state): State<AppState>,
    Path((username, db_name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let (cancel, _guard) = state.request_token();
    let result = state
        .service
        .credentials(&username, &db_name, state.credentials_timeout, &cancel)
        .await;
    state.metrics.record("credentials", outcome(&result));

    match result {
        Ok(credentials) => Ok(Json(json!({
            "db_name": db_name,
            "username": username,
            "credentials": credentials,
        }))
        .into_response()),
        Err(Error::NotYetAvailable(detail)) => {
            debug!(detail = %detail, "凭据尚未就绪");
            Ok((
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "Credentials not yet available",
                    "message": "Database may still be initializing",
                })),
            )
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /databases/:username
pub async fn list_databases(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<TenantClusters>, ApiError> {
    let result = state.service.list_for_tenant(&username).await;
    state.metrics.record("list", outcome(&result));
    Ok(Json(result?))
}
