//! Pod 清单与租户管理接口

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use tenantdb_common::naming::tenant_namespace;
use tenantdb_common::PodGroup;

use super::error::ApiError;
use super::outcome;
use crate::AppState;

/// GET /pods/:namespace
pub async fn list_namespace_pods(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<PodGroup>, ApiError> {
    Ok(Json(state.service.list_pods(&namespace).await?))
}

/// GET /admin/tenants/pods
pub async fn list_tenant_pods(
    State(state): State<AppState>,
) -> Result<Json<Vec<PodGroup>>, ApiError> {
    Ok(Json(state.service.list_tenant_pods().await?))
}

/// DELETE /admin/tenants/:username
pub async fn delete_tenant(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Value>, ApiError> {
    info!(username = %username, "收到租户删除请求");
    let result = state.service.delete_tenant(&username).await;
    state.metrics.record("delete_tenant", outcome(&result));
    result?;

    Ok(Json(json!({
        "message": "Tenant deleted successfully",
        "namespace": tenant_namespace(&username),
    })))
}
