use async_trait::async_trait;
use domain::{RoomId, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 按主题向当前订阅的流式连接推送负载。
#[async_trait]
pub trait TopicBroadcaster: Send + Sync {
    /// 返回收到负载的订阅者数量，没有订阅者时为 0
    async fn broadcast(&self, topic: &str, payload: String) -> Result<usize, BroadcastError>;
}

pub const ROOM_TOPIC_PREFIX: &str = "/topic/room/";

/// 房间主题
pub fn room_topic(room_id: RoomId) -> String {
    format!("{ROOM_TOPIC_PREFIX}{room_id}")
}

/// 用户个人通知主题
pub fn user_topic(user_id: UserId) -> String {
    format!("/user/{user_id}/notifications")
}
