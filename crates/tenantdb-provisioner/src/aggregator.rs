//! 状态聚合模块
//!
//! 将集群资源阶段、Pod 和凭据 Secret 三路独立读取的信号合并为单一状态。
//! 优先级固定：资源不存在 → 阶段文本映射 → Pod 运行升级为 Ready → Secret 存在强制 Ready。
//! 因此集群可能处于 `Ready` 但 `credentials_ready = false`（Pod 已运行，Secret 尚未生成）。

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use tenantdb_common::{ClusterStatus, ClusterStatusSnapshot, CreationMethod, PodSummary};

use crate::crd::Postgresql;

/// Operator 阶段文本到状态的映射
pub fn map_phase(phase: Option<&str>) -> ClusterStatus {
    match phase {
        Some("Running") => ClusterStatus::Running,
        Some("Creating") => ClusterStatus::Creating,
        Some("CreateFailed") => ClusterStatus::Failed,
        _ => ClusterStatus::Pending,
    }
}

/// Pod 是否处于运行阶段
pub fn pod_is_running(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        == Some("Running")
}

/// Pod 是否运行且所有容器就绪
pub fn pod_is_ready(pod: &Pod) -> bool {
    if !pod_is_running(pod) {
        return false;
    }
    match pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref())
    {
        Some(containers) if !containers.is_empty() => containers.iter().all(|c| c.ready),
        _ => false,
    }
}

/// 构建 Pod 摘要
pub fn summarize_pod(pod: &Pod) -> PodSummary {
    let status = pod.status.as_ref();
    let restarts = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|containers| containers.iter().map(|c| c.restart_count).sum::<i32>())
        .unwrap_or(0);

    PodSummary {
        name: pod.name_any(),
        namespace: pod.namespace().unwrap_or_default(),
        phase: status
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        ready: pod_is_ready(pod),
        restarts,
        node: pod.spec.as_ref().and_then(|spec| spec.node_name.clone()),
        pod_ip: status.and_then(|s| s.pod_ip.clone()),
        created_at: pod.metadata.creation_timestamp.as_ref().map(|t| t.0),
    }
}

/// 合并三路信号
///
/// `cluster` 为 None 表示集群资源不存在，此时忽略其余信号。
pub fn aggregate(
    name: &str,
    namespace: &str,
    cluster: Option<&Postgresql>,
    pods: &[Pod],
    secret_present: bool,
) -> ClusterStatusSnapshot {
    let Some(cluster) = cluster else {
        return ClusterStatusSnapshot::not_found(name, namespace);
    };

    let phase = cluster.phase();
    let running_replicas = pods.iter().filter(|pod| pod_is_running(pod)).count() as u32;

    let mut status = map_phase(phase);
    let mut detail = match status {
        ClusterStatus::Running => "Operator reports the cluster as running".to_string(),
        ClusterStatus::Creating => "Operator is creating the cluster".to_string(),
        ClusterStatus::Failed => "Operator failed to create the cluster".to_string(),
        _ => match phase {
            Some(phase) => format!("Waiting for the operator (phase: {phase})"),
            None => "Waiting for the operator to pick up the cluster".to_string(),
        },
    };

    if running_replicas > 0 {
        status = ClusterStatus::Ready;
        detail = "Database pods are running, credentials are not yet available".to_string();
    }

    let mut snapshot = ClusterStatusSnapshot {
        name: name.to_string(),
        namespace: namespace.to_string(),
        status,
        detail,
        created_at: cluster.metadata.creation_timestamp.as_ref().map(|t| t.0),
        replicas: cluster.replicas(),
        running_replicas,
        credentials_ready: false,
        connection_ready: false,
        creation_method: CreationMethod::Manual,
    };

    if secret_present {
        snapshot.status = ClusterStatus::Ready;
        snapshot.detail = "Database is ready and credentials are available".to_string();
        snapshot.credentials_ready = true;
        snapshot.connection_ready = true;
        snapshot.creation_method = CreationMethod::OperatorManaged;
    }

    snapshot
}
