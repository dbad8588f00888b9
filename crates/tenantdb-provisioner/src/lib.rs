//! TenantDB 供给核心
//!
//! 该模块实现租户数据库集群的创建、状态汇总、凭据读取与回收。
//! 使用 kube-rs 与 Kubernetes API 交互，数据库集群由外部 PostgreSQL Operator 调谐。

pub mod aggregator;
pub mod crd;
pub mod gateway;
pub mod poller;
pub mod renderer;
pub mod service;
pub mod utils;

pub use crd::{Postgresql, PostgresqlSpec, PostgresqlStatus};
pub use gateway::{ClusterGateway, KubeGateway, ResourceKind};
pub use poller::{poll_until, PollError, PollSettings, Probe};
pub use renderer::{ManifestRenderer, RenderParams, TemplateSource};
pub use service::{ProvisionedDatabase, ProvisioningConfig, ProvisioningService};
