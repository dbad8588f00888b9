//! 数据库集群状态模型
//!
//! 状态快照是每次读取时由集群资源、Pod 和 Secret 三路信号实时推导出的视图，
//! 从不持久化。状态只会沿 `NotFound → Pending → Creating → Running → Ready`
//! 前进，或进入 `Failed` / `Error`。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 集群状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterStatus {
    /// 集群资源不存在
    NotFound,
    /// 已提交，Operator 尚未开始处理
    Pending,
    /// Operator 正在创建
    Creating,
    /// Operator 报告运行中
    Running,
    /// Pod 已运行或凭据已生成
    Ready,
    /// Operator 报告创建失败
    Failed,
    /// 读取状态本身失败
    Error,
}

impl ClusterStatus {
    /// 是否为失败状态
    pub fn is_failure(&self) -> bool {
        matches!(self, ClusterStatus::Failed | ClusterStatus::Error)
    }

    /// 是否仍在创建过程中
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            ClusterStatus::Pending | ClusterStatus::Creating | ClusterStatus::Running
        )
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ClusterStatus::NotFound => "NotFound",
            ClusterStatus::Pending => "Pending",
            ClusterStatus::Creating => "Creating",
            ClusterStatus::Running => "Running",
            ClusterStatus::Ready => "Ready",
            ClusterStatus::Failed => "Failed",
            ClusterStatus::Error => "Error",
        };
        f.write_str(text)
    }
}

/// 集群创建方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreationMethod {
    /// 由 Operator 管理（已生成凭据 Secret）
    #[serde(rename = "operator-managed")]
    OperatorManaged,
    /// 未观测到 Operator 生成的凭据
    #[serde(rename = "manual")]
    Manual,
}

/// 集群状态快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatusSnapshot {
    /// 数据库集群名称
    pub name: String,
    /// 所在命名空间
    pub namespace: String,
    /// 汇总状态
    pub status: ClusterStatus,
    /// 状态说明
    pub detail: String,
    /// 集群资源创建时间
    pub created_at: Option<DateTime<Utc>>,
    /// 期望副本数
    pub replicas: u32,
    /// 正在运行的副本数
    pub running_replicas: u32,
    /// 凭据 Secret 是否已生成
    pub credentials_ready: bool,
    /// 是否可以建立连接
    pub connection_ready: bool,
    /// 创建方式
    pub creation_method: CreationMethod,
}

impl ClusterStatusSnapshot {
    /// 创建一个不存在状态的快照
    pub fn not_found(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            status: ClusterStatus::NotFound,
            detail: format!("Database cluster {name} not found in namespace {namespace}"),
            created_at: None,
            replicas: 0,
            running_replicas: 0,
            credentials_ready: false,
            connection_ready: false,
            creation_method: CreationMethod::Manual,
        }
    }

    /// 读取失败时用于列表中的占位快照
    pub fn errored(name: &str, namespace: &str, detail: impl Into<String>) -> Self {
        Self {
            status: ClusterStatus::Error,
            detail: detail.into(),
            ..Self::not_found(name, namespace)
        }
    }
}

/// 租户集群汇总计数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub total: usize,
    pub ready: usize,
    pub creating: usize,
    pub failed: usize,
    pub credentials_ready: usize,
    pub connection_ready: usize,
    pub manual_created: usize,
    pub operator_created: usize,
}

impl ClusterSummary {
    /// 根据快照列表统计
    pub fn from_snapshots(clusters: &[ClusterStatusSnapshot]) -> Self {
        let mut summary = Self {
            total: clusters.len(),
            ..Self::default()
        };

        for cluster in clusters {
            if cluster.status == ClusterStatus::Ready {
                summary.ready += 1;
            } else if cluster.status.is_in_progress() {
                summary.creating += 1;
            } else if cluster.status.is_failure() {
                summary.failed += 1;
            }

            if cluster.credentials_ready {
                summary.credentials_ready += 1;
            }
            if cluster.connection_ready {
                summary.connection_ready += 1;
            }

            match cluster.creation_method {
                CreationMethod::Manual => summary.manual_created += 1,
                CreationMethod::OperatorManaged => summary.operator_created += 1,
            }
        }

        summary
    }
}

/// 某个租户下的全部集群
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantClusters {
    pub username: String,
    pub namespace: String,
    pub clusters: Vec<ClusterStatusSnapshot>,
    pub total_clusters: usize,
    pub summary: ClusterSummary,
}

impl TenantClusters {
    /// 由快照列表构建
    pub fn new(username: &str, namespace: &str, clusters: Vec<ClusterStatusSnapshot>) -> Self {
        let summary = ClusterSummary::from_snapshots(&clusters);
        Self {
            username: username.to_string(),
            namespace: namespace.to_string(),
            total_clusters: clusters.len(),
            clusters,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: ClusterStatus, credentials: bool) -> ClusterStatusSnapshot {
        ClusterStatusSnapshot {
            status,
            credentials_ready: credentials,
            connection_ready: credentials,
            creation_method: if credentials {
                CreationMethod::OperatorManaged
            } else {
                CreationMethod::Manual
            },
            ..ClusterStatusSnapshot::not_found("db", "tenant-alice")
        }
    }

    #[test]
    fn test_summary_counts() {
        let clusters = vec![
            snapshot(ClusterStatus::Ready, true),
            snapshot(ClusterStatus::Ready, false),
            snapshot(ClusterStatus::Creating, false),
            snapshot(ClusterStatus::Pending, false),
            snapshot(ClusterStatus::Failed, false),
            snapshot(ClusterStatus::Error, false),
        ];

        let summary = ClusterSummary::from_snapshots(&clusters);
        assert_eq!(summary.total, 6);
        assert_eq!(summary.ready, 2);
        assert_eq!(summary.creating, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.credentials_ready, 1);
        assert_eq!(summary.connection_ready, 1);
        assert_eq!(summary.operator_created, 1);
        assert_eq!(summary.manual_created, 5);
    }

    #[test]
    fn test_status_serializes_as_plain_text() {
        let value = serde_json::to_value(ClusterStatus::NotFound).unwrap();
        assert_eq!(value, serde_json::json!("NotFound"));
        let value = serde_json::to_value(CreationMethod::OperatorManaged).unwrap();
        assert_eq!(value, serde_json::json!("operator-managed"));
    }

    #[test]
    fn test_errored_snapshot() {
        let snapshot = ClusterStatusSnapshot::errored("db", "tenant-alice", "boom");
        assert_eq!(snapshot.status, ClusterStatus::Error);
        assert_eq!(snapshot.detail, "boom");
        assert!(!snapshot.credentials_ready);
    }
}
