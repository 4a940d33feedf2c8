//! 流式连接的会话属性存储
//!
//! 握手成功后以连接 ID 为键写入身份属性，连接上的每条指令在分发时重新读取。
//! 过期的条目在读取时视为不存在，并由存储自身的定时清理任务回收。

use std::time::Duration;

use async_trait::async_trait;
use domain::{Timestamp, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAttributes {
    pub user_id: UserId,
    pub username: String,
    pub token: String,
    pub bound_at: Timestamp,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<SessionAttributes>, SessionError>;
    async fn put(
        &self,
        key: &str,
        attributes: SessionAttributes,
        ttl: Duration,
    ) -> Result<(), SessionError>;
    async fn remove(&self, key: &str) -> Result<Option<SessionAttributes>, SessionError>;
    /// 清理过期条目，返回清理数量
    async fn sweep_expired(&self) -> Result<usize, SessionError>;
}
