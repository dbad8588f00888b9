//! 配置管理模块
//!
//! 该模块负责加载 API 服务的配置：可选的 YAML/JSON/TOML 配置文件，
//! 叠加 `TENANTDB_` 前缀的环境变量（层级用 `__` 分隔，例如 `TENANTDB_SERVER__PORT=9000`）。
//! 所有字段都有默认值，加载后统一校验。

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use tenantdb_common::{Error, Result};
use tenantdb_provisioner::ProvisioningConfig;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "TENANTDB";

/// API 服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 日志级别，`RUST_LOG` 优先
    pub log_level: String,
    /// kubeconfig 路径，集群内运行时忽略
    pub kubeconfig: Option<PathBuf>,
    /// 自定义清单模板路径，未设置时使用内置模板
    pub template_path: Option<PathBuf>,
    /// HTTP 服务配置
    pub server: ServerConfig,
    /// 供给流程配置
    pub provisioning: ProvisioningSettings,
    /// 认证配置
    pub auth: AuthConfig,
    /// 健康检查配置
    pub health: HealthCheckConfig,
}

/// HTTP 服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 单个请求的超时（秒），需覆盖完整的创建流程
    pub request_timeout_secs: u64,
    /// 允许跨域的来源，为空时允许任意来源
    pub cors_origins: Vec<String>,
}

/// 供给流程配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningSettings {
    pub poll_interval_secs: u64,
    pub pod_ready_timeout_secs: u64,
    pub secret_ready_timeout_secs: u64,
    /// 凭据接口的等待时间
    pub credentials_timeout_secs: u64,
    pub delete_grace_secs: u64,
    pub namespace_attempts: usize,
    pub max_replicas: u32,
}

/// 认证配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// 关闭后所有接口都不校验令牌
    pub enabled: bool,
    /// 签名公钥集地址
    pub jwks_url: String,
    /// 期望的签发者
    pub issuer: Option<String>,
    /// 期望的受众
    pub audience: Option<String>,
    /// 角色声明名称
    pub roles_claim: String,
    /// 访问数据库与 Pod 接口所需角色（任一）
    pub user_roles: Vec<String>,
    /// 访问管理接口所需角色（任一）
    pub admin_roles: Vec<String>,
}

/// 健康检查配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// 检查间隔（秒）
    pub interval_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            kubeconfig: None,
            template_path: None,
            server: ServerConfig::default(),
            provisioning: ProvisioningSettings::default(),
            auth: AuthConfig::default(),
            health: HealthCheckConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 330,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            pod_ready_timeout_secs: 180,
            secret_ready_timeout_secs: 120,
            credentials_timeout_secs: 5,
            delete_grace_secs: 3,
            namespace_attempts: 3,
            max_replicas: 5,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jwks_url: "http://localhost:8081/oauth/v2/keys".to_string(),
            issuer: None,
            audience: None,
            roles_claim: "urn:zitadel:iam:org:project:roles".to_string(),
            user_roles: vec!["user".to_string(), "admin".to_string()],
            admin_roles: vec!["admin".to_string()],
        }
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 30,
        }
    }
}

impl AppConfig {
    /// 加载配置：配置文件（可选）叠加环境变量，然后校验
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config(format!("配置文件不存在: {}", path.display())));
            }
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::Config(format!("构建配置失败: {e}")))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("配置格式错误: {e}")))?;
        app_config.validate()?;

        debug!(?app_config, "配置加载完成");
        Ok(app_config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        let p = &self.provisioning;
        for (name, value) in [
            ("provisioning.poll_interval_secs", p.poll_interval_secs),
            ("provisioning.pod_ready_timeout_secs", p.pod_ready_timeout_secs),
            ("provisioning.secret_ready_timeout_secs", p.secret_ready_timeout_secs),
            ("provisioning.credentials_timeout_secs", p.credentials_timeout_secs),
            ("server.request_timeout_secs", self.server.request_timeout_secs),
            ("health.interval_seconds", self.health.interval_seconds),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{name} 必须大于 0")));
            }
        }
        if p.namespace_attempts == 0 {
            return Err(Error::Config("provisioning.namespace_attempts 必须大于 0".to_string()));
        }
        if p.max_replicas == 0 {
            return Err(Error::Config("provisioning.max_replicas 必须大于 0".to_string()));
        }

        if self.auth.enabled {
            let url = url::Url::parse(&self.auth.jwks_url)
                .map_err(|e| Error::Config(format!("auth.jwks_url 无效: {e}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::Config(format!(
                    "auth.jwks_url 必须使用 http 或 https: {}",
                    self.auth.jwks_url
                )));
            }
            if self.auth.user_roles.is_empty() || self.auth.admin_roles.is_empty() {
                return Err(Error::Config("auth.user_roles 与 auth.admin_roles 不能为空".to_string()));
            }
        }

        Ok(())
    }

    /// 供给服务使用的流程参数
    pub fn provisioning_config(&self) -> ProvisioningConfig {
        let p = &self.provisioning;
        ProvisioningConfig {
            poll_interval: Duration::from_secs(p.poll_interval_secs),
            pod_ready_timeout: Duration::from_secs(p.pod_ready_timeout_secs),
            secret_ready_timeout: Duration::from_secs(p.secret_ready_timeout_secs),
            delete_grace: Duration::from_secs(p.delete_grace_secs),
            namespace_attempts: p.namespace_attempts,
            max_replicas: p.max_replicas,
            ..ProvisioningConfig::default()
        }
    }

    /// 凭据接口的等待时间
    pub fn credentials_timeout(&self) -> Duration {
        Duration::from_secs(self.provisioning.credentials_timeout_secs)
    }

    /// 请求超时
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}
