use std::sync::Arc;

use domain::{DomainError, RepositoryError, User, UserId, Username};

use crate::{
    clock::Clock,
    dto::UserDto,
    error::ApplicationError,
    password::PasswordHasher,
    repository::UserRepository,
    token::{IssuedToken, TokenService},
};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: UserDto,
    pub token: IssuedToken,
}

pub struct UserServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub token_service: Arc<dyn TokenService>,
    pub clock: Arc<dyn Clock>,
}

pub struct UserService {
    deps: UserServiceDependencies,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn register(&self, request: RegisterUserRequest) -> Result<UserDto, ApplicationError> {
        let username = Username::parse(request.username)?;
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::invalid_argument(
                "password",
                format!("must be at least {MIN_PASSWORD_LEN} characters"),
            )
            .into());
        }

        if self
            .deps
            .user_repository
            .find_by_username(&username)
            .await?
            .is_some()
        {
            return Err(DomainError::UsernameTaken.into());
        }

        let password_hash = self.deps.password_hasher.hash(&request.password).await?;
        let user = User::register(UserId::generate(), username, password_hash, self.deps.clock.now());

        // 并发注册同名用户时由唯一约束兜底
        let stored = match self.deps.user_repository.save(user).await {
            Ok(stored) => stored,
            Err(RepositoryError::Duplicate { .. }) => return Err(DomainError::UsernameTaken.into()),
            Err(err) => return Err(err.into()),
        };

        tracing::info!(user_id = %stored.id, username = %stored.username, "用户已注册");
        Ok(UserDto::from(&stored))
    }

    /// 校验用户名和密码并签发访问令牌
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, ApplicationError> {
        let username = Username::parse(username).map_err(|_| ApplicationError::Authentication)?;
        let user = self
            .deps
            .user_repository
            .find_by_username(&username)
            .await?
            .ok_or(ApplicationError::Authentication)?;

        let password_ok = self
            .deps
            .password_hasher
            .verify(password, &user.password)
            .await?;
        if !password_ok {
            tracing::warn!(user_id = %user.id, "密码校验失败");
            return Err(ApplicationError::Authentication);
        }

        let token = self.deps.token_service.issue(user.id, user.username.as_str())?;
        Ok(LoginOutcome {
            user: UserDto::from(&user),
            token,
        })
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<UserDto, ApplicationError> {
        let user = self
            .deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or(DomainError::UserNotFound)?;
        Ok(UserDto::from(&user))
    }
}
