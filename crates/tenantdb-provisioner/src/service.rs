//! 供给服务模块
//!
//! 编排租户数据库的完整生命周期：命名空间 → 渲染并应用清单 → 等待 Pod 就绪 →
//! 等待凭据 Secret → 组装凭据包。两个等待阶段严格按顺序执行，超时时间各自独立配置。
//!
//! 同一租户的并发 `create`/`delete` 之间没有任何协调，所有写操作都按幂等方式实现。

use futures::future::{join_all, try_join_all};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tenantdb_common::naming::{
    cleanup_secrets, cluster_pod_selector, default_db_name, is_tenant_namespace,
    normalize_db_name, primary_secret, tenant_namespace, validate_db_name, validate_username,
};
use tenantdb_common::{
    ClusterStatusSnapshot, CredentialBundle, Error, PodGroup, PrimaryUser, Result, TenantClusters,
};

use crate::aggregator::{aggregate, pod_is_ready, summarize_pod};
use crate::gateway::{ClusterGateway, ResourceKind};
use crate::poller::{poll_until, PollError, PollSettings, Probe, DEFAULT_POLL_INTERVAL};
use crate::renderer::{ManifestRenderer, RenderParams};
use crate::utils::{format_duration, retry_async};

/// 供给流程参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    /// 就绪探测间隔
    pub poll_interval: Duration,
    /// Pod 就绪等待上限
    pub pod_ready_timeout: Duration,
    /// 凭据 Secret 等待上限
    pub secret_ready_timeout: Duration,
    /// 删除集群后等待 Operator 清理的时长
    pub delete_grace: Duration,
    /// 命名空间创建的最大尝试次数
    pub namespace_attempts: usize,
    /// 命名空间创建重试间隔
    pub namespace_retry_delay: Duration,
    /// 允许的最大副本数
    pub max_replicas: u32,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            pod_ready_timeout: Duration::from_secs(180),
            secret_ready_timeout: Duration::from_secs(120),
            delete_grace: Duration::from_secs(3),
            namespace_attempts: 3,
            namespace_retry_delay: Duration::from_secs(1),
            max_replicas: 5,
        }
    }
}

/// 创建成功的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedDatabase {
    pub namespace: String,
    pub db_name: String,
    pub credentials: CredentialBundle,
}

/// 凭据 Secret 的一次观测
#[derive(Debug)]
enum SecretObservation {
    Present(Secret),
    Absent,
    Failed(String),
}

impl fmt::Display for SecretObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretObservation::Present(_) => f.write_str("secret present"),
            SecretObservation::Absent => f.write_str("secret not found"),
            SecretObservation::Failed(e) => write!(f, "secret query failed: {e}"),
        }
    }
}

/// 租户数据库供给服务
#[derive(Clone)]
pub struct ProvisioningService {
    gateway: Arc<dyn ClusterGateway>,
    renderer: ManifestRenderer,
    config: ProvisioningConfig,
}

impl ProvisioningService {
    /// 创建新的供给服务
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        renderer: ManifestRenderer,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            gateway,
            renderer,
            config,
        }
    }

    /// 解析副本数：未提供或为 0 时取 1
    fn resolve_replicas(&self, replicas: Option<i32>) -> Result<u32> {
        match replicas {
            None | Some(0) => Ok(1),
            Some(n) if n < 0 => Err(Error::Validation(format!("replicas 不能为负数: {n}"))),
            Some(n) => {
                let n = n as u32;
                if n > self.config.max_replicas {
                    return Err(Error::Validation(format!(
                        "replicas 不能超过 {}: {n}",
                        self.config.max_replicas
                    )));
                }
                Ok(n)
            }
        }
    }

    /// 校验租户与数据库名，返回 (命名空间, 规范化后的数据库名)
    fn resolve_target(&self, username: &str, db_name: &str) -> Result<(String, String)> {
        validate_username(username)?;
        let db_name = normalize_db_name(db_name);
        validate_db_name(&db_name)?;
        Ok((tenant_namespace(username), db_name))
    }

    /// 创建数据库集群并等待凭据
    pub async fn create(
        &self,
        username: &str,
        db_name: Option<&str>,
        replicas: Option<i32>,
        cancel: &CancellationToken,
    ) -> Result<ProvisionedDatabase> {
        validate_username(username)?;
        let db_name = match db_name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => default_db_name(username),
        };
        let (namespace, db_name) = self.resolve_target(username, &db_name)?;
        let replicas = self.resolve_replicas(replicas)?;
        let started = Instant::now();

        info!(
            namespace = %namespace,
            db_name = %db_name,
            replicas,
            "开始创建数据库集群"
        );

        let gateway = self.gateway.as_ref();
        let ns = namespace.as_str();
        retry_async(
            "创建命名空间",
            self.config.namespace_attempts,
            self.config.namespace_retry_delay,
            cancel,
            move || gateway.ensure_namespace(ns),
        )
        .await?;

        let manifest = self
            .renderer
            .render(&RenderParams::new(&namespace, &db_name, username, replicas))?;
        self.gateway.apply(&manifest).await?;

        self.wait_for_pods(&namespace, &db_name, cancel).await?;
        info!(namespace = %namespace, db_name = %db_name, "Pod 已就绪，等待凭据");

        let secret = self
            .wait_for_secret(&namespace, &db_name, self.config.secret_ready_timeout, cancel)
            .await?;
        let credentials = decode_credentials(&secret, &namespace, &db_name)?;

        info!(
            namespace = %namespace,
            db_name = %db_name,
            elapsed = %format_duration(started.elapsed()),
            "数据库集群创建完成"
        );

        Ok(ProvisionedDatabase {
            namespace,
            db_name,
            credentials,
        })
    }

    /// 等待至少一个 Pod 运行且所有容器就绪
    async fn wait_for_pods(
        &self,
        namespace: &str,
        db_name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let settings = PollSettings::with_deadline(self.config.pod_ready_timeout)
            .interval(self.config.poll_interval);
        let gateway = self.gateway.as_ref();
        let selector = cluster_pod_selector(db_name);
        let selector = selector.as_str();

        poll_until(settings, cancel, move || async move {
            match gateway.list_pods(namespace, selector).await {
                Ok(pods) => {
                    let ready = pods.iter().filter(|pod| pod_is_ready(pod)).count();
                    let observed = format!("{ready}/{} pods ready", pods.len());
                    if ready > 0 {
                        Probe::ready(observed)
                    } else {
                        Probe::pending(observed)
                    }
                }
                Err(e) => Probe::pending(format!("pod query failed: {e}")),
            }
        })
        .await
        .map_err(|e| poll_failure("Pod 就绪", e))?;

        Ok(())
    }

    /// 等待主凭据 Secret 出现
    async fn wait_for_secret(
        &self,
        namespace: &str,
        db_name: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Secret> {
        let settings = PollSettings::with_deadline(timeout).interval(self.config.poll_interval);
        let gateway = self.gateway.as_ref();
        let secret = primary_secret(namespace, db_name);
        let (secret_ns, secret_name) = (secret.namespace.as_str(), secret.name.as_str());

        let observed = poll_until(settings, cancel, move || async move {
            match gateway.get_secret(secret_ns, secret_name).await {
                Ok(Some(secret)) => Probe::ready(SecretObservation::Present(secret)),
                Ok(None) => Probe::pending(SecretObservation::Absent),
                Err(e) => Probe::pending(SecretObservation::Failed(e.to_string())),
            }
        })
        .await
        .map_err(|e| poll_failure("凭据 Secret", e))?;

        match observed {
            SecretObservation::Present(secret) => Ok(secret),
            other => Err(Error::NotYetAvailable(format!("{secret}: {other}"))),
        }
    }

    /// 删除数据库集群及其凭据 Secret
    pub async fn delete(
        &self,
        username: &str,
        db_name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (namespace, db_name) = self.resolve_target(username, db_name)?;

        match self
            .gateway
            .delete_resource(ResourceKind::DatabaseCluster, &db_name, &namespace)
            .await
        {
            Ok(()) => info!(namespace = %namespace, db_name = %db_name, "已删除数据库集群资源"),
            Err(Error::NotFound(_)) => {
                debug!(namespace = %namespace, db_name = %db_name, "数据库集群资源不存在")
            }
            Err(e) => return Err(e),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled {
                    phase: "Operator 清理".to_string(),
                    last_observed: "cluster resource deleted".to_string(),
                });
            }
            _ = tokio::time::sleep(self.config.delete_grace) => {}
        }

        for secret in cleanup_secrets(&namespace, &db_name) {
            match self
                .gateway
                .delete_resource(ResourceKind::Secret, &secret.name, &secret.namespace)
                .await
            {
                Ok(()) => debug!(secret = %secret, "已删除凭据 Secret"),
                Err(Error::NotFound(_)) => debug!(secret = %secret, "凭据 Secret 不存在"),
                Err(e) => warn!(secret = %secret, error = %e, "删除凭据 Secret 失败"),
            }
        }

        Ok(())
    }

    /// 读取单个集群的状态
    pub async fn status(&self, username: &str, db_name: &str) -> Result<ClusterStatusSnapshot> {
        let (namespace, db_name) = self.resolve_target(username, db_name)?;
        self.status_in(&namespace, &db_name).await
    }

    async fn status_in(&self, namespace: &str, db_name: &str) -> Result<ClusterStatusSnapshot> {
        let cluster = match self.gateway.get_cluster(namespace, db_name).await {
            Ok(Some(cluster)) => cluster,
            Ok(None) | Err(Error::NotFound(_)) => {
                return Ok(ClusterStatusSnapshot::not_found(db_name, namespace))
            }
            Err(e) => return Err(e),
        };

        let secret = primary_secret(namespace, db_name);
        let selector = cluster_pod_selector(db_name);
        let (pods, secret) = tokio::try_join!(
            self.gateway.list_pods(namespace, &selector),
            self.gateway.get_secret(&secret.namespace, &secret.name),
        )?;

        Ok(aggregate(
            db_name,
            namespace,
            Some(&cluster),
            &pods,
            secret.is_some(),
        ))
    }

    /// 列出租户下的所有集群，单个集群读取失败不影响其他集群
    pub async fn list_for_tenant(&self, username: &str) -> Result<TenantClusters> {
        validate_username(username)?;
        let namespace = tenant_namespace(username);

        let clusters = match self.gateway.list_clusters(&namespace).await {
            Ok(clusters) => clusters,
            Err(Error::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        let ns = namespace.as_str();
        let snapshots = join_all(clusters.iter().map(move |cluster| async move {
            let name = cluster.name_any();
            match self.status_in(ns, &name).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(namespace = %ns, db_name = %name, error = %e, "读取集群状态失败");
                    ClusterStatusSnapshot::errored(&name, ns, e.to_string())
                }
            }
        }))
        .await;

        Ok(TenantClusters::new(username, &namespace, snapshots))
    }

    /// 读取凭据，在 `timeout` 内 Secret 仍未出现时返回 [`Error::NotYetAvailable`]
    pub async fn credentials(
        &self,
        username: &str,
        db_name: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CredentialBundle> {
        let (namespace, db_name) = self.resolve_target(username, db_name)?;

        let secret = match self
            .wait_for_secret(&namespace, &db_name, timeout, cancel)
            .await
        {
            Ok(secret) => secret,
            Err(Error::Timeout { last_observed, .. }) => {
                return Err(Error::NotYetAvailable(format!(
                    "{namespace}/{db_name}: {last_observed}"
                )))
            }
            Err(e) => return Err(e),
        };

        decode_credentials(&secret, &namespace, &db_name)
    }

    /// 列出单个租户命名空间中的 Pod
    pub async fn list_pods(&self, namespace: &str) -> Result<PodGroup> {
        if !is_tenant_namespace(namespace) {
            return Err(Error::Validation(format!(
                "命名空间 '{namespace}' 不是租户命名空间"
            )));
        }
        let pods = self.gateway.list_pods(namespace, "").await?;
        Ok(PodGroup::new(
            namespace,
            pods.iter().map(summarize_pod).collect(),
        ))
    }

    /// 列出所有租户命名空间中的 Pod
    pub async fn list_tenant_pods(&self) -> Result<Vec<PodGroup>> {
        let namespaces: Vec<String> = self
            .gateway
            .list_namespaces()
            .await?
            .into_iter()
            .filter(|ns| is_tenant_namespace(ns))
            .collect();

        try_join_all(namespaces.iter().map(|ns| self.list_pods(ns))).await
    }

    /// 删除整个租户命名空间
    pub async fn delete_tenant(&self, username: &str) -> Result<()> {
        validate_username(username)?;
        let namespace = tenant_namespace(username);

        match self.gateway.delete_namespace(&namespace).await {
            Ok(()) => info!(namespace = %namespace, "已提交租户删除"),
            Err(Error::NotFound(_)) => debug!(namespace = %namespace, "租户命名空间不存在"),
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

/// 轮询失败转换为统一错误
fn poll_failure<S: fmt::Debug + fmt::Display>(phase: &str, error: PollError<S>) -> Error {
    let last_observed = error.last_observed_text();
    match error {
        PollError::Timeout { .. } => Error::Timeout {
            phase: phase.to_string(),
            last_observed,
        },
        PollError::Cancelled { .. } => Error::Cancelled {
            phase: phase.to_string(),
            last_observed,
        },
    }
}

/// 从 Secret 中读取用户名和密码并组装凭据包
fn decode_credentials(secret: &Secret, namespace: &str, db_name: &str) -> Result<CredentialBundle> {
    let field = |key: &str| -> Result<String> {
        match secret.data.as_ref().and_then(|data| data.get(key)) {
            Some(value) => String::from_utf8(value.0.clone()).map_err(|_| {
                Error::InvalidCredentials(format!(
                    "{namespace}/{db_name} 的 {key} 不是有效的 UTF-8"
                ))
            }),
            None => Ok(String::new()),
        }
    };

    let user = PrimaryUser {
        username: field("username")?,
        password: field("password")?,
    };
    CredentialBundle::new(db_name, namespace, user)
}
