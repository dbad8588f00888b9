//! 错误处理模块
//!
//! 该模块提供 TenantDB 项目的统一错误类型。错误分类与控制面对外的语义一一对应：
//! 平台不可达、资源不存在、等待超时、模板渲染失败、清单被拒绝等，
//! HTTP 层依据变体决定返回的状态码。

use thiserror::Error;

/// TenantDB 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 无法连接集群 API 服务器
    #[error("集群客户端不可用: {0}")]
    ClientUnavailable(String),

    /// 命名空间、数据库集群或 Secret 不存在
    #[error("资源不存在: {0}")]
    NotFound(String),

    /// 轮询超过截止时间，携带最后一次观测到的状态
    #[error("等待{phase}超时，最后观测状态: {last_observed}")]
    Timeout {
        /// 等待阶段
        phase: String,
        /// 最后观测状态
        last_observed: String,
    },

    /// 调用方取消了等待（请求断开、超时或服务关闭）
    #[error("等待{phase}已被取消，最后观测状态: {last_observed}")]
    Cancelled {
        /// 等待阶段
        phase: String,
        /// 最后观测状态
        last_observed: String,
    },

    /// 凭据 Secret 尚未由 Operator 生成
    #[error("凭据尚未就绪: {0}")]
    NotYetAvailable(String),

    /// 清单模板渲染失败
    #[error("模板渲染错误: {0}")]
    Render(String),

    /// 清单被集群拒绝，原样携带 API 服务器返回的诊断信息
    #[error("清单应用失败: {0}")]
    Apply(String),

    /// 请求参数校验失败
    #[error("参数校验失败: {0}")]
    Validation(String),

    /// 凭据 Secret 内容不完整
    #[error("凭据格式错误: {0}")]
    InvalidCredentials(String),

    /// 其他集群 API 错误
    #[error("集群 API 错误: {0}")]
    Platform(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
}

impl Error {
    /// 是否属于“资源不存在”类错误
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// TenantDB 结果类型别名
pub type Result<T> = std::result::Result<T, Error>;
