//! 认证与授权模块
//!
//! 令牌校验通过 [`TokenVerifier`] 注入到路由状态中。生产环境使用 [`JwksVerifier`]：
//! 启动时获取一次签名公钥集，只接受非对称签名算法，按 `kid` 查找公钥。
//! 角色声明是 `角色 → 非空对象` 的映射，值为空对象的角色视为未授予。

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::AuthConfig;

/// 已认证的调用方
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// 令牌主体
    pub subject: String,
    /// 已授予的角色
    pub roles: BTreeSet<String>,
}

impl Principal {
    /// 是否拥有任一角色
    pub fn has_any_role(&self, roles: &[String]) -> bool {
        roles.iter().any(|role| self.roles.contains(role))
    }
}

/// 认证错误
#[derive(Error, Debug)]
pub enum AuthError {
    /// 请求未携带令牌
    #[error("缺少 Authorization 头")]
    MissingToken,

    /// 令牌无效或已过期
    #[error("令牌无效: {0}")]
    InvalidToken(String),

    /// 获取签名公钥失败
    #[error("获取签名公钥失败: {0}")]
    Jwks(String),
}

/// 令牌校验接口
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// 校验令牌并返回调用方
    async fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

/// 基于 JWKS 的令牌校验
pub struct JwksVerifier {
    keys: JwkSet,
    issuer: Option<String>,
    audience: Option<String>,
    roles_claim: String,
}

impl JwksVerifier {
    /// 使用已获取的公钥集创建
    pub fn new(keys: JwkSet, config: &AuthConfig) -> Self {
        Self {
            keys,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            roles_claim: config.roles_claim.clone(),
        }
    }

    /// 获取公钥集并创建
    pub async fn fetch(config: &AuthConfig) -> Result<Self, AuthError> {
        let keys: JwkSet = reqwest::Client::new()
            .get(&config.jwks_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AuthError::Jwks(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::Jwks(e.to_string()))?;

        info!(keys = keys.keys.len(), url = %config.jwks_url, "已加载签名公钥集");
        Ok(Self::new(keys, config))
    }

    fn verify_token(&self, token: &str) -> Result<Principal, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if !is_algorithm_allowed(header.alg) {
            return Err(AuthError::InvalidToken(format!("不支持的签名算法 {:?}", header.alg)));
        }
        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| AuthError::InvalidToken("令牌缺少 kid".to_string()))?;
        let jwk = self
            .keys
            .find(kid)
            .ok_or_else(|| AuthError::InvalidToken(format!("未知的 kid {kid}")))?;
        let key = DecodingKey::from_jwk(jwk).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let mut validation = Validation::new(header.alg);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        let data = decode::<Value>(token, &key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(Principal {
            subject: data
                .claims
                .get("sub")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            roles: roles_from_claims(&data.claims, &self.roles_claim),
        })
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        self.verify_token(token)
    }
}

/// 只接受非对称签名算法
fn is_algorithm_allowed(alg: Algorithm) -> bool {
    matches!(
        alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
            | Algorithm::ES256
            | Algorithm::ES384
            | Algorithm::EdDSA
    )
}

/// 读取角色声明
pub fn roles_from_claims(claims: &Value, roles_claim: &str) -> BTreeSet<String> {
    claims
        .get(roles_claim)
        .and_then(Value::as_object)
        .map(|roles| {
            roles
                .iter()
                .filter(|(_, grant)| grant.as_object().is_some_and(|grant| !grant.is_empty()))
                .map(|(role, _)| role.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// 路由组的角色要求
#[derive(Clone)]
pub struct RoleGate {
    /// 为 None 时不做认证
    verifier: Option<Arc<dyn TokenVerifier>>,
    required: Arc<[String]>,
}

impl RoleGate {
    pub fn new(verifier: Option<Arc<dyn TokenVerifier>>, required: Vec<String>) -> Self {
        Self {
            verifier,
            required: required.into(),
        }
    }
}

/// 认证中间件：校验令牌并要求任一角色，通过后把 [`Principal`] 放入请求扩展
pub async fn require_roles(State(gate): State<RoleGate>, mut request: Request, next: Next) -> Response {
    let Some(verifier) = gate.verifier.as_ref() else {
        return next.run(request).await;
    };

    let Some(token) = bearer_token(request.headers()).map(str::to_string) else {
        return reject(StatusCode::UNAUTHORIZED, "missing Authorization header");
    };

    let principal = match verifier.verify(&token).await {
        Ok(principal) => principal,
        Err(e) => {
            debug!("令牌校验失败: {}", e);
            return reject(StatusCode::UNAUTHORIZED, "invalid or expired token");
        }
    };

    if principal.roles.is_empty() {
        return reject(StatusCode::FORBIDDEN, "no roles in token");
    }
    if !principal.has_any_role(&gate.required) {
        debug!(subject = %principal.subject, "缺少所需角色");
        return reject(StatusCode::FORBIDDEN, "insufficient permissions");
    }

    request.extensions_mut().insert(principal);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    #[test]
    fn test_roles_require_non_empty_grant() {
        let claims = json!({
            "sub": "u1",
            "urn:zitadel:iam:org:project:roles": {
                "user": {"123": "example.org"},
                "admin": {}
            }
        });

        let roles = roles_from_claims(&claims, "urn:zitadel:iam:org:project:roles");
        assert_eq!(roles, BTreeSet::from(["user".to_string()]));
        assert!(roles_from_claims(&claims, "roles").is_empty());
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_symmetric_tokens_are_rejected() {
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({"sub": "u1", "exp": 4_102_444_800u64}),
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let verifier = JwksVerifier::new(JwkSet { keys: vec![] }, &AuthConfig::default());
        assert!(matches!(
            verifier.verify_token(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_has_any_role() {
        let principal = Principal {
            subject: "u1".to_string(),
            roles: BTreeSet::from(["user".to_string()]),
        };
        assert!(principal.has_any_role(&["user".to_string(), "admin".to_string()]));
        assert!(!principal.has_any_role(&["admin".to_string()]));
    }
}
