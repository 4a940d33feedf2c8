use domain::{DomainError, ErrorKind, RepositoryError};
use thiserror::Error;

use crate::password::PasswordHasherError;
use crate::session::SessionError;
use crate::token::TokenError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    #[error("token error: {0}")]
    Token(#[from] TokenError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    /// 用户名或密码错误
    #[error("authentication failed")]
    Authentication,
}

impl ApplicationError {
    /// 领域错误的分类，基础设施错误返回 `None`
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ApplicationError::Domain(err) => Some(err.kind()),
            ApplicationError::Repository(RepositoryError::NotFound) => Some(ErrorKind::NotFound),
            ApplicationError::Repository(RepositoryError::Duplicate { .. }) => {
                Some(ErrorKind::AlreadyExists)
            }
            _ => None,
        }
    }
}
