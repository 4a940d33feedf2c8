//! 访问令牌端口
//!
//! HTTP 中间件与流式握手共用同一个校验入口。

use domain::{Timestamp, UserId};
use thiserror::Error;

/// 校验通过的令牌所携带的身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub user_id: UserId,
    pub username: String,
    pub expires_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: Timestamp,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("failed to issue token: {0}")]
    Issue(String),
}

pub trait TokenService: Send + Sync {
    fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError>;
    fn issue(&self, user_id: UserId, username: &str) -> Result<IssuedToken, TokenError>;
}
