//! TenantDB Common - 跨模块共享的数据模型与工具
//!
//! 该模块提供 TenantDB 所有组件共享的数据结构、命名规则和统一的错误处理机制。
//! 包括集群状态快照、凭据包、Pod 清单等模型，以及命名空间、Secret 名称的推导函数。

pub mod error;
pub mod models;

/// 重新导出常用类型，方便使用
pub use error::Error;
pub use error::Result;
pub use models::cluster::*;
pub use models::credentials::*;
pub use models::naming;
pub use models::pods::*;
