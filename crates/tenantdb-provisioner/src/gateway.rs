//! 集群网关模块
//!
//! 对 Kubernetes 原语的一层薄封装：命名空间的获取/创建/删除、声明式应用清单、
//! 按标签列出 Pod、读取/删除 Secret。网关本身不做任何重试，
//! 重试由调用方通过轮询原语或有界重试完成。
//!
//! 与平台的连接在每个服务实例中只建立一次并复用；`kube::Client` 可安全地并发使用。

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams},
    config::{Config, KubeConfigOptions, Kubeconfig},
    core::GroupVersionKind,
    discovery::{self, Scope},
    Client, ResourceExt,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use tenantdb_common::{Error, Result};

use crate::crd::Postgresql;

/// 服务端应用使用的字段管理者
pub const FIELD_MANAGER: &str = "tenantdb";

/// 标记由本服务创建的资源
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// 可删除的资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Operator 的数据库集群资源
    DatabaseCluster,
    /// Secret
    Secret,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::DatabaseCluster => f.write_str("postgresql"),
            ResourceKind::Secret => f.write_str("secret"),
        }
    }
}

/// 集群操作抽象
///
/// 生产环境使用 [`KubeGateway`]，测试中可以替换为模拟实现。
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// 探测 API 服务器，返回其版本
    async fn ping(&self) -> Result<String>;

    /// 确保命名空间存在；已存在（包括并发创建导致的冲突）视为成功
    async fn ensure_namespace(&self, name: &str) -> Result<()>;

    /// 声明式应用清单（可包含多个 YAML 文档）
    async fn apply(&self, manifest: &[u8]) -> Result<()>;

    /// 读取数据库集群资源，不存在时返回 None
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Postgresql>>;

    /// 列出命名空间中的所有数据库集群资源
    async fn list_clusters(&self, namespace: &str) -> Result<Vec<Postgresql>>;

    /// 按标签选择器列出 Pod
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;

    /// 读取 Secret，不存在时返回 None
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// 删除资源，不存在时返回 [`Error::NotFound`]
    async fn delete_resource(&self, kind: ResourceKind, name: &str, namespace: &str) -> Result<()>;

    /// 删除命名空间，不存在时返回 [`Error::NotFound`]
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    /// 列出所有命名空间名称
    async fn list_namespaces(&self) -> Result<Vec<String>>;
}

/// 基于 kube-rs 的网关实现
#[derive(Clone)]
pub struct KubeGateway {
    /// Kubernetes 客户端
    client: Client,
}

impl KubeGateway {
    /// 使用已有客户端创建网关
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// 建立与 API 服务器的连接
    ///
    /// 优先使用集群内身份，失败时回退到 kubeconfig 文件（指定路径或默认位置）。
    /// 连接建立后立即探测一次，不可达时返回 [`Error::ClientUnavailable`]。
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        let config = match Config::incluster() {
            Ok(config) => {
                info!("使用集群内身份连接 API 服务器");
                config
            }
            Err(e) => {
                debug!(error = %e, "集群内配置不可用，回退到 kubeconfig");
                Self::load_kubeconfig(kubeconfig).await?
            }
        };

        let client = Client::try_from(config)
            .map_err(|e| Error::ClientUnavailable(format!("创建客户端失败: {e}")))?;
        let gateway = Self::new(client);

        let version = gateway
            .ping()
            .await
            .map_err(|e| Error::ClientUnavailable(e.to_string()))?;
        info!(version = %version, "已连接 Kubernetes API 服务器");

        Ok(gateway)
    }

    /// 加载 kubeconfig
    async fn load_kubeconfig(path: Option<&Path>) -> Result<Config> {
        let options = KubeConfigOptions::default();
        let config = match path {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::ClientUnavailable(format!("无法读取 kubeconfig {}: {e}", path.display()))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &options).await
            }
            None => Config::from_kubeconfig(&options).await,
        };

        config.map_err(|e| Error::ClientUnavailable(format!("kubeconfig 无效: {e}")))
    }

    /// 服务端应用单个对象
    async fn apply_object(&self, obj: DynamicObject) -> Result<()> {
        let types = obj
            .types
            .as_ref()
            .ok_or_else(|| Error::Apply("清单缺少 apiVersion 或 kind".to_string()))?;
        let gvk = GroupVersionKind::try_from(types)
            .map_err(|e| Error::Apply(format!("无效的 apiVersion: {e}")))?;
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::Apply(format!("{} 清单缺少 metadata.name", gvk.kind)))?;

        let (resource, capabilities) = discovery::pinned_kind(&self.client, &gvk)
            .await
            .map_err(|e| discovery_error(&gvk, e))?;

        let api: Api<DynamicObject> = if capabilities.scope == Scope::Namespaced {
            let namespace = obj.metadata.namespace.as_deref().ok_or_else(|| {
                Error::Apply(format!("{}/{} 清单缺少 metadata.namespace", gvk.kind, name))
            })?;
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        };

        api.patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&obj))
            .await
            .map_err(|e| match e {
                kube::Error::Api(response) => Error::Apply(response.message),
                other => Error::Apply(other.to_string()),
            })?;

        info!(kind = %gvk.kind, name = %name, "已应用清单");
        Ok(())
    }
}

/// 将多文档 YAML 清单拆分为对象，跳过空文档
fn parse_manifest(manifest: &[u8]) -> Result<Vec<DynamicObject>> {
    let text = std::str::from_utf8(manifest)
        .map_err(|e| Error::Apply(format!("清单不是有效的 UTF-8: {e}")))?;

    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| Error::Apply(format!("清单解析失败: {e}")))?;
        if value.is_null() {
            continue;
        }
        let obj: DynamicObject = serde_yaml::from_value(value)
            .map_err(|e| Error::Apply(format!("清单结构无效: {e}")))?;
        objects.push(obj);
    }
    Ok(objects)
}

/// 资源类型无法发现时清单不可应用，404 同样视为应用失败
fn discovery_error(gvk: &GroupVersionKind, error: kube::Error) -> Error {
    let detail = match error {
        kube::Error::Api(response) => response.message,
        other => other.to_string(),
    };
    Error::Apply(format!(
        "无法发现资源类型 {}/{} {}: {detail}",
        gvk.group, gvk.version, gvk.kind
    ))
}

/// 将 kube 错误转换为统一错误，404 映射为 NotFound
fn platform_error(context: &str, error: kube::Error) -> Error {
    match error {
        kube::Error::Api(response) if response.code == 404 => {
            Error::NotFound(format!("{context}: {}", response.message))
        }
        kube::Error::Api(response) => Error::Platform(format!("{context}: {}", response.message)),
        other => Error::Platform(format!("{context}: {other}")),
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn ping(&self) -> Result<String> {
        let info = self
            .client
            .apiserver_version()
            .await
            .map_err(|e| platform_error("无法获取 API 服务器版本", e))?;
        Ok(info.git_version)
    }

    async fn ensure_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());

        let existing = api
            .get_opt(name)
            .await
            .map_err(|e| platform_error(&format!("读取命名空间 {name} 失败"), e))?;
        if existing.is_some() {
            debug!(namespace = %name, "命名空间已存在");
            return Ok(());
        }

        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(BTreeMap::from([(
                    MANAGED_BY_LABEL.to_string(),
                    FIELD_MANAGER.to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        };

        match api.create(&PostParams::default(), &namespace).await {
            Ok(_) => {
                info!(namespace = %name, "已创建命名空间");
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == 409 => {
                debug!(namespace = %name, "命名空间已被并发创建");
                Ok(())
            }
            Err(e) => Err(platform_error(&format!("创建命名空间 {name} 失败"), e)),
        }
    }

    async fn apply(&self, manifest: &[u8]) -> Result<()> {
        for obj in parse_manifest(manifest)? {
            self.apply_object(obj).await?;
        }
        Ok(())
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Postgresql>> {
        let api: Api<Postgresql> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| platform_error(&format!("读取数据库集群 {namespace}/{name} 失败"), e))
    }

    async fn list_clusters(&self, namespace: &str) -> Result<Vec<Postgresql>> {
        let api: Api<Postgresql> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| platform_error(&format!("列出 {namespace} 中的数据库集群失败"), e))?;
        Ok(list.items)
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut params = ListParams::default();
        if !label_selector.is_empty() {
            params = params.labels(label_selector);
        }
        let pods = api
            .list(&params)
            .await
            .map_err(|e| platform_error(&format!("获取 {namespace} 的 Pod 列表失败"), e))?;
        Ok(pods.items)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| platform_error(&format!("读取 Secret {namespace}/{name} 失败"), e))
    }

    async fn delete_resource(&self, kind: ResourceKind, name: &str, namespace: &str) -> Result<()> {
        let params = DeleteParams::default();
        let context = format!("删除 {kind} {namespace}/{name} 失败");
        match kind {
            ResourceKind::DatabaseCluster => {
                let api: Api<Postgresql> = Api::namespaced(self.client.clone(), namespace);
                api.delete(name, &params)
                    .await
                    .map_err(|e| platform_error(&context, e))?;
            }
            ResourceKind::Secret => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
                api.delete(name, &params)
                    .await
                    .map_err(|e| platform_error(&context, e))?;
            }
        }
        info!(kind = %kind, namespace = %namespace, name = %name, "已提交删除");
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| platform_error(&format!("删除命名空间 {name} 失败"), e))?;
        info!(namespace = %name, "已提交命名空间删除");
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| platform_error("列出命名空间失败", e))?;
        Ok(list.items.iter().map(|ns| ns.name_any()).collect())
    }
}
