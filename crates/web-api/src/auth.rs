//! JWT 认证模块
//!
//! 提供令牌签发与校验、HTTP 认证中间件，以及 HTTP 与流式握手共用的凭证提取。

use application::{Actor, IssuedToken, TokenError, TokenService, VerifiedToken};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Duration, Utc};
use config::JwtConfig;
use domain::UserId;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, EncodingKey,
    Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: i64, // 过期时间 (Unix timestamp)
    pub iat: i64,
}

/// HS256 令牌服务
#[derive(Clone)]
pub struct JwtService {
    expiration: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            expiration: Duration::hours(config.expiration_hours),
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }

    /// 以指定的签发时间生成令牌
    pub fn issue_at(
        &self,
        user_id: UserId,
        username: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = issued_at + self.expiration;
        let claims = Claims {
            sub: Uuid::from(user_id),
            username: username.to_owned(),
            exp: expires_at.timestamp(),
            iat: issued_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| TokenError::Issue(err.to_string()))?;
        Ok(IssuedToken { token, expires_at })
    }
}

impl TokenService for JwtService {
    fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|err| {
            match err.kind() {
                JwtErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(err.to_string()),
            }
        })?;

        let claims = data.claims;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| TokenError::Invalid(format!("exp out of range: {}", claims.exp)))?;
        Ok(VerifiedToken {
            user_id: UserId::from(claims.sub),
            username: claims.username,
            expires_at,
        })
    }

    fn issue(&self, user_id: UserId, username: &str) -> Result<IssuedToken, TokenError> {
        self.issue_at(user_id, username, Utc::now())
    }
}

/// 从请求头提取凭证：先看 `Authorization: Bearer`，再看指定名称的 Cookie。
///
/// 查询参数中的令牌一律忽略。
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_owned());
    }

    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|cookie| cookie.value().to_owned())
        .filter(|token| !token.is_empty())
}

/// 通过认证的请求身份，由 [`require_auth`] 写入请求扩展
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: UserId,
    pub username: String,
}

impl From<AuthUser> for Actor {
    fn from(user: AuthUser) -> Self {
        Actor::new(user.user_id, user.username)
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ApiError::authentication_failed("missing credentials"))
    }
}

/// 受保护路由的认证中间件
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers(), &state.cookie_name)
        .ok_or_else(|| ApiError::authentication_failed("missing credentials"))?;

    let verified = state.token_service.verify(&token).map_err(|err| {
        tracing::debug!(error = %err, "HTTP 请求令牌校验失败");
        ApiError::authentication_failed(err.to_string())
    })?;

    request.extensions_mut().insert(AuthUser {
        user_id: verified.user_id,
        username: verified.username,
    });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn service() -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "0123456789abcdef0123456789abcdef".to_owned(),
            expiration_hours: 1,
            cookie_name: "access_token".to_owned(),
        })
    }

    #[test]
    fn issued_token_verifies() {
        let jwt = service();
        let user_id = UserId::generate();
        let issued = jwt.issue(user_id, "alice").unwrap();

        let verified = jwt.verify(&issued.token).unwrap();
        assert_eq!(verified.user_id, user_id);
        assert_eq!(verified.username, "alice");
        assert_eq!(verified.expires_at.timestamp(), issued.expires_at.timestamp());
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let jwt = service();
        let issued = jwt
            .issue_at(UserId::generate(), "alice", Utc::now() - Duration::hours(2))
            .unwrap();

        assert_eq!(jwt.verify(&issued.token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let other = JwtService::new(&JwtConfig {
            secret: "another-secret-another-secret-another".to_owned(),
            expiration_hours: 1,
            cookie_name: "access_token".to_owned(),
        });
        let issued = other.issue(UserId::generate(), "mallory").unwrap();

        assert!(matches!(
            service().verify(&issued.token),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        headers.insert(header::COOKIE, HeaderValue::from_static("access_token=from-cookie"));

        assert_eq!(extract_token(&headers, "access_token").as_deref(), Some("from-header"));
    }

    #[test]
    fn cookie_is_used_without_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; access_token=from-cookie"),
        );

        assert_eq!(extract_token(&headers, "access_token").as_deref(), Some("from-cookie"));
        assert_eq!(extract_token(&headers, "session"), None);
    }

    #[test]
    fn malformed_authorization_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));

        assert_eq!(extract_token(&headers, "access_token"), None);
    }
}
