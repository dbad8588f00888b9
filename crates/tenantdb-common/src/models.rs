//! 数据模型模块
//!
//! 该模块定义了 TenantDB 使用的核心数据模型：集群状态快照、凭据包、Pod 清单，
//! 以及所有资源名称的确定性推导规则。

pub mod cluster;
pub mod credentials;
pub mod naming;
pub mod pods;
