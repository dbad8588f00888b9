//! 命名规则模型
//!
//! 所有集群资源的名称都是租户用户名与数据库名的纯函数：命名空间、Secret、
//! 服务地址和 Pod 标签选择器。Secret 名称遵循 Operator 的约定：
//! `<dbName>.<dbName>.credentials.<operator-domain>`。
//!
//! 不同租户选择相同的数据库名时 Secret 名称相同，因此 Secret 始终以
//! [`SecretRef`]（命名空间 + 名称）定位，而不是单独的名称。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// 租户命名空间前缀
pub const TENANT_NAMESPACE_PREFIX: &str = "tenant-";

/// Operator 的 Secret 域名后缀
pub const OPERATOR_DOMAIN: &str = "postgresql.acid.zalan.do";

/// 超级用户名称
pub const SUPERUSER: &str = "postgres";

/// 数据库服务端口
pub const POSTGRES_PORT: u16 = 5432;

/// 集群内服务域名后缀
pub const SERVICE_DOMAIN: &str = "svc.cluster.local";

/// Kubernetes 名称长度上限（DNS-1123 label）
pub const MAX_NAME_LENGTH: usize = 63;

static DNS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("DNS label 正则无效"));

/// Secret 引用（命名空间 + 名称）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretRef {
    /// 所在命名空间
    pub namespace: String,
    /// Secret 名称
    pub name: String,
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// 租户对应的命名空间
pub fn tenant_namespace(username: &str) -> String {
    format!("{TENANT_NAMESPACE_PREFIX}{username}")
}

/// 从命名空间反推租户用户名
pub fn tenant_from_namespace(namespace: &str) -> Option<&str> {
    namespace
        .strip_prefix(TENANT_NAMESPACE_PREFIX)
        .filter(|username| !username.is_empty())
}

/// 是否为租户命名空间
pub fn is_tenant_namespace(namespace: &str) -> bool {
    tenant_from_namespace(namespace).is_some()
}

/// 未指定数据库名时的默认名称
pub fn default_db_name(username: &str) -> String {
    format!("{username}-db")
}

/// 数据库名规范化：集群资源名只接受小写
pub fn normalize_db_name(db_name: &str) -> String {
    db_name.trim().to_lowercase()
}

/// 指定用户的凭据 Secret 名称
pub fn user_secret_name(user: &str, db_name: &str) -> String {
    format!("{user}.{db_name}.credentials.{OPERATOR_DOMAIN}")
}

/// 主凭据 Secret 名称
pub fn secret_name(db_name: &str) -> String {
    user_secret_name(db_name, db_name)
}

/// 主凭据 Secret 引用
pub fn primary_secret(namespace: &str, db_name: &str) -> SecretRef {
    SecretRef {
        namespace: namespace.to_string(),
        name: secret_name(db_name),
    }
}

/// 删除集群时需要清理的 Secret（主用户与超级用户）
pub fn cleanup_secrets(namespace: &str, db_name: &str) -> Vec<SecretRef> {
    vec![
        primary_secret(namespace, db_name),
        SecretRef {
            namespace: namespace.to_string(),
            name: user_secret_name(SUPERUSER, db_name),
        },
    ]
}

/// 集群内的数据库服务地址
pub fn service_host(db_name: &str, namespace: &str) -> String {
    format!("{db_name}.{namespace}.{SERVICE_DOMAIN}")
}

/// 选择某个数据库集群 Pod 的标签选择器
pub fn cluster_pod_selector(db_name: &str) -> String {
    format!("application=spilo,cluster-name={db_name}")
}

/// 校验租户用户名
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(Error::Validation("username 不能为空".to_string()));
    }
    if !DNS_LABEL.is_match(username) {
        return Err(Error::Validation(format!(
            "username '{username}' 只能包含小写字母、数字和 '-'，且必须以字母或数字开头和结尾"
        )));
    }
    let namespace = tenant_namespace(username);
    if namespace.len() > MAX_NAME_LENGTH {
        return Err(Error::Validation(format!(
            "命名空间 '{namespace}' 超过 {MAX_NAME_LENGTH} 个字符"
        )));
    }
    Ok(())
}

/// 校验（已规范化的）数据库名
pub fn validate_db_name(db_name: &str) -> Result<()> {
    if db_name.is_empty() {
        return Err(Error::Validation("db_name 不能为空".to_string()));
    }
    if db_name.len() > MAX_NAME_LENGTH || !DNS_LABEL.is_match(db_name) {
        return Err(Error::Validation(format!(
            "db_name '{db_name}' 不是合法的 DNS-1123 名称"
        )));
    }
    Ok(())
}
