//! Pod 清单模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 单个 Pod 的摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSummary {
    pub name: String,
    pub namespace: String,
    /// Pod 阶段：Pending、Running、Succeeded、Failed、Unknown
    pub phase: String,
    /// 所有容器都已就绪
    pub ready: bool,
    pub restarts: i32,
    pub node: Option<String>,
    pub pod_ip: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl PodSummary {
    /// 是否处于运行阶段
    pub fn is_running(&self) -> bool {
        self.phase == "Running"
    }
}

/// 按命名空间分组的 Pod 清单
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodGroup {
    pub namespace: String,
    pub pods: Vec<PodSummary>,
    pub total: usize,
}

impl PodGroup {
    pub fn new(namespace: &str, pods: Vec<PodSummary>) -> Self {
        Self {
            namespace: namespace.to_string(),
            total: pods.len(),
            pods,
        }
    }
}
