//! 健康检查模块
//!
//! 后台定期探测 Kubernetes API 服务器，保存最新结果，
//! 供 `/health` 与 `/ready` 探针读取。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tenantdb_provisioner::ClusterGateway;

/// 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// 健康
    Healthy,
    /// 不健康
    Unhealthy,
}

/// 健康检查结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheckResult {
    /// 健康状态
    pub status: HealthStatus,
    /// 详细信息
    pub details: String,
    /// 上次检查时间
    pub last_check: DateTime<Utc>,
    /// API 服务器版本
    pub api_server_version: Option<String>,
}

/// 健康检查器
pub struct HealthChecker {
    /// 集群网关
    gateway: Arc<dyn ClusterGateway>,
    /// 检查间隔
    interval: Duration,
    /// 最新的健康检查结果
    latest_result: RwLock<HealthCheckResult>,
}

impl HealthChecker {
    /// 创建新的健康检查器
    pub fn new(gateway: Arc<dyn ClusterGateway>, interval: Duration) -> Self {
        let initial_result = HealthCheckResult {
            status: HealthStatus::Unhealthy,
            details: "健康检查尚未运行".to_string(),
            last_check: Utc::now(),
            api_server_version: None,
        };

        Self {
            gateway,
            interval,
            latest_result: RwLock::new(initial_result),
        }
    }

    /// 执行一次检查并保存结果
    pub async fn check_once(&self) -> HealthCheckResult {
        let result = match self.gateway.ping().await {
            Ok(version) => HealthCheckResult {
                status: HealthStatus::Healthy,
                details: "Kubernetes API 服务器可达".to_string(),
                last_check: Utc::now(),
                api_server_version: Some(version),
            },
            Err(e) => {
                warn!("健康检查失败: {}", e);
                HealthCheckResult {
                    status: HealthStatus::Unhealthy,
                    details: e.to_string(),
                    last_check: Utc::now(),
                    api_server_version: None,
                }
            }
        };

        *self.latest_result.write().await = result.clone();
        result
    }

    /// 启动后台检查任务，`shutdown` 触发后退出
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            info!("健康检查任务已启动，间隔 {:?}", self.interval);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("健康检查任务退出");
                        break;
                    }
                    _ = interval.tick() => {
                        self.check_once().await;
                    }
                }
            }
        })
    }

    /// 获取最新的健康检查结果
    pub async fn latest(&self) -> HealthCheckResult {
        self.latest_result.read().await.clone()
    }
}
