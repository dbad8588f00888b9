//! HTTP 路由
//!
//! 数据库与 Pod 接口要求普通用户角色，`/admin` 下的接口要求管理员角色；
//! 横幅、健康探针与指标接口不做认证。

pub mod databases;
pub mod error;
pub mod pods;
pub mod system;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use tenantdb_common::{Error, Result};

use self::error::ApiError;
use crate::auth::{require_roles, RoleGate, TokenVerifier};
use crate::AppState;

/// 路由选项
#[derive(Clone)]
pub struct RouterOptions {
    /// 为 None 时关闭认证
    pub verifier: Option<Arc<dyn TokenVerifier>>,
    pub user_roles: Vec<String>,
    pub admin_roles: Vec<String>,
    pub request_timeout: Duration,
    /// 为空时允许任意来源
    pub cors_origins: Vec<String>,
}

/// 构建完整路由
pub fn build_router(state: AppState, options: RouterOptions) -> Router {
    let user_gate = RoleGate::new(options.verifier.clone(), options.user_roles.clone());
    let admin_gate = RoleGate::new(options.verifier.clone(), options.admin_roles.clone());

    let user_routes = Router::new()
        .route(
            "/databases",
            post(databases::create_database).delete(databases::delete_database),
        )
        .route("/databases/:username", get(databases::list_databases))
        .route(
            "/databases/:username/:db_name",
            get(databases::database_details),
        )
        .route(
            "/databases/:username/:db_name/status",
            get(databases::database_status),
        )
        .route(
            "/databases/:username/:db_name/credentials",
            get(databases::database_credentials),
        )
        .route("/pods/:namespace", get(pods::list_namespace_pods))
        .route_layer(from_fn_with_state(user_gate, require_roles));

    let admin_routes = Router::new()
        .route("/admin/tenants/pods", get(pods::list_tenant_pods))
        .route("/admin/tenants/:username", delete(pods::delete_tenant))
        .route_layer(from_fn_with_state(admin_gate, require_roles));

    Router::new()
        .route("/", get(system::index))
        .route("/health", get(system::health))
        .route("/ready", get(system::ready))
        .route("/metrics", get(system::metrics))
        .merge(user_routes)
        .merge(admin_routes)
        .layer(from_fn_with_state(options.request_timeout, enforce_timeout))
        .layer(cors_layer(&options.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 请求超时后丢弃处理函数的 future，并返回 500 `{error}`
async fn enforce_timeout(State(limit): State<Duration>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(path = %path, timeout = ?limit, "请求处理超时");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("request timed out after {limit:?}"),
            )
            .into_response()
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// 操作结果的指标标签
pub(crate) fn outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(Error::Validation(_)) => "invalid",
        Err(Error::NotFound(_) | Error::NotYetAvailable(_)) => "not_found",
        Err(Error::Timeout { .. }) => "timeout",
        Err(Error::Cancelled { .. }) => "cancelled",
        Err(_) => "error",
    }
}
