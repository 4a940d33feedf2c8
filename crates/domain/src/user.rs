use serde::{Deserialize, Serialize};

use crate::value_objects::{PasswordHash, Timestamp, UserId, Username};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    #[serde(skip_serializing)] // 密码字段不暴露给客户端
    pub password: PasswordHash,
    pub created_at: Timestamp,
}

impl User {
    pub fn register(id: UserId, username: Username, password: PasswordHash, now: Timestamp) -> Self {
        Self {
            id,
            username,
            password,
            created_at: now,
        }
    }
}
