//! 清单渲染模块
//!
//! 将租户参数渲染为 Operator 的声明式资源清单。渲染是纯函数：
//! 同样的参数总是得到同样的字节序列。模板使用严格的未定义变量策略，
//! 引用了未提供的字段会直接返回渲染错误。

use minijinja::{Environment, UndefinedBehavior, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use tenantdb_common::{Error, Result};

/// 内置的数据库集群模板
const BUILTIN_TEMPLATE: &str = include_str!("../templates/postgresql.yaml");

/// 模板名称，不带扩展名以避免自动转义
const TEMPLATE_NAME: &str = "manifest";

/// 模板来源
#[derive(Debug, Clone)]
pub enum TemplateSource {
    /// 随程序打包的模板
    Builtin,
    /// 内联模板文本
    Inline(String),
    /// 渲染时从文件读取
    File(PathBuf),
}

/// 渲染参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderParams {
    pub namespace: String,
    pub db_name: String,
    pub team: String,
    pub replicas: u32,
    /// 仅部分模板使用
    pub db_user: Option<String>,
    /// 仅部分模板使用
    pub password: Option<String>,
}

impl RenderParams {
    pub fn new(namespace: &str, db_name: &str, team: &str, replicas: u32) -> Self {
        Self {
            namespace: namespace.to_string(),
            db_name: db_name.to_string(),
            team: team.to_string(),
            replicas,
            db_user: None,
            password: None,
        }
    }

    /// 构建模板上下文，可选字段只在提供时定义
    fn context(&self) -> BTreeMap<&'static str, Value> {
        let mut ctx = BTreeMap::new();
        ctx.insert("Namespace", Value::from(self.namespace.as_str()));
        ctx.insert("DBName", Value::from(self.db_name.to_lowercase()));
        ctx.insert("Team", Value::from(self.team.as_str()));
        ctx.insert("Replicas", Value::from(self.replicas));
        if let Some(user) = &self.db_user {
            ctx.insert("DBUser", Value::from(user.as_str()));
        }
        if let Some(password) = &self.password {
            ctx.insert("Password", Value::from(password.as_str()));
        }
        ctx
    }
}

/// 清单渲染器
#[derive(Debug, Clone)]
pub struct ManifestRenderer {
    source: TemplateSource,
}

impl Default for ManifestRenderer {
    fn default() -> Self {
        Self::new(TemplateSource::Builtin)
    }
}

impl ManifestRenderer {
    /// 创建新的渲染器
    pub fn new(source: TemplateSource) -> Self {
        Self { source }
    }

    /// 从模板文件创建渲染器，文件在每次渲染时读取
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::new(TemplateSource::File(path.into()))
    }

    /// 读取模板文本
    fn load_template(&self) -> Result<String> {
        match &self.source {
            TemplateSource::Builtin => Ok(BUILTIN_TEMPLATE.to_string()),
            TemplateSource::Inline(text) => Ok(text.clone()),
            TemplateSource::File(path) => std::fs::read_to_string(path).map_err(|e| {
                Error::Render(format!("无法读取模板文件 {}: {}", path.display(), e))
            }),
        }
    }

    /// 渲染清单
    pub fn render(&self, params: &RenderParams) -> Result<Vec<u8>> {
        let template = self.load_template()?;

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.add_template(TEMPLATE_NAME, &template)
            .map_err(|e| Error::Render(format!("模板语法错误: {e}")))?;

        let rendered = env
            .get_template(TEMPLATE_NAME)
            .map_err(|e| Error::Render(e.to_string()))?
            .render(params.context())
            .map_err(|e| Error::Render(format!("渲染失败: {e}")))?;

        debug!(
            namespace = %params.namespace,
            db_name = %params.db_name,
            bytes = rendered.len(),
            "清单渲染完成"
        );

        Ok(rendered.into_bytes())
    }
}
