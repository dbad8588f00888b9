//! 自定义资源定义模块
//!
//! 该模块定义外部 PostgreSQL Operator 管理的 `postgresql` 自定义资源。
//! 资源由 Operator 安装到集群中，这里只声明读取时需要的字段，
//! 其余字段原样保留以便容忍 Operator 版本差异。

use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// 数据库集群规范
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "acid.zalan.do",
    version = "v1",
    kind = "postgresql",
    plural = "postgresqls",
    struct = "Postgresql",
    namespaced,
    schema = "disabled"
)]
#[kube(status = "PostgresqlStatus")]
#[serde(rename_all = "camelCase")]
pub struct PostgresqlSpec {
    /// 团队标识
    #[serde(default)]
    pub team_id: String,

    /// 实例数量
    #[serde(default = "default_instances")]
    pub number_of_instances: i32,

    /// 存储卷配置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<serde_json::Value>,

    /// 数据库用户及其权限
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<serde_json::Value>,

    /// 数据库与属主
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub databases: Option<serde_json::Value>,

    /// PostgreSQL 版本与参数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgresql: Option<serde_json::Value>,
}

/// Operator 上报的集群状态
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PostgresqlStatus {
    /// 阶段文本：Running、Creating、CreateFailed 等
    #[serde(rename = "PostgresClusterStatus", default)]
    pub postgres_cluster_status: String,
}

/// 默认实例数量
fn default_instances() -> i32 {
    1
}

impl Postgresql {
    /// Operator 上报的阶段文本，未上报时为 None
    pub fn phase(&self) -> Option<&str> {
        self.status
            .as_ref()
            .map(|status| status.postgres_cluster_status.as_str())
            .filter(|phase| !phase.is_empty())
    }

    /// 期望副本数
    pub fn replicas(&self) -> u32 {
        u32::try_from(self.spec.number_of_instances).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_resource_identity() {
        assert_eq!(Postgresql::group(&()), "acid.zalan.do");
        assert_eq!(Postgresql::version(&()), "v1");
        assert_eq!(Postgresql::kind(&()), "postgresql");
        assert_eq!(Postgresql::plural(&()), "postgresqls");
    }

    #[test]
    fn test_deserialize_operator_object() {
        let cluster: Postgresql = serde_json::from_value(serde_json::json!({
            "apiVersion": "acid.zalan.do/v1",
            "kind": "postgresql",
            "metadata": {"name": "alice-db", "namespace": "tenant-alice"},
            "spec": {
                "teamId": "alice",
                "numberOfInstances": 2,
                "volume": {"size": "1Gi"},
                "unknownField": true
            },
            "status": {"PostgresClusterStatus": "Running"}
        }))
        .unwrap();

        assert_eq!(cluster.replicas(), 2);
        assert_eq!(cluster.phase(), Some("Running"));
    }

    #[test]
    fn test_missing_status_has_no_phase() {
        let cluster: Postgresql = serde_json::from_value(serde_json::json!({
            "apiVersion": "acid.zalan.do/v1",
            "kind": "postgresql",
            "metadata": {"name": "db"},
            "spec": {}
        }))
        .unwrap();

        assert_eq!(cluster.phase(), None);
        assert_eq!(cluster.replicas(), 1);
    }
}
