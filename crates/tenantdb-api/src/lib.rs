//! TenantDB API
//!
//! 租户数据库自助服务的 HTTP 边界：路由与错误映射、令牌校验、配置加载、
//! 健康检查与指标导出。所有协作者在启动时构建一次，通过 [`AppState`] 注入处理函数。

pub mod api;
pub mod auth;
pub mod config;
pub mod health;
pub mod metrics;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};

use tenantdb_provisioner::ProvisioningService;

pub use api::{build_router, RouterOptions};

/// 处理函数共享的状态
#[derive(Clone)]
pub struct AppState {
    /// 供给服务
    pub service: ProvisioningService,
    /// 指标收集器
    pub metrics: metrics::Metrics,
    /// 健康检查器
    pub health: Arc<health::HealthChecker>,
    /// 服务关闭信号
    pub shutdown: CancellationToken,
    /// 凭据接口的等待时间
    pub credentials_timeout: Duration,
}

impl AppState {
    /// 为单个请求派生取消令牌
    ///
    /// 服务关闭时令牌被取消；守卫随处理函数的 future 一起被丢弃（客户端断开或请求超时）时也会取消。
    pub fn request_token(&self) -> (CancellationToken, DropGuard) {
        let token = self.shutdown.child_token();
        let guard = token.clone().drop_guard();
        (token, guard)
    }
}
