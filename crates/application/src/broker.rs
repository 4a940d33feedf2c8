//! 消息代理端口
//!
//! 生产端只负责按主题和键追加记录；消费端以消费者组为单位订阅，
//! 每个组维护独立的偏移量，由调用方在处理完成后手动提交。

use async_trait::async_trait;
use domain::EventStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("publish to {topic} failed: {message}")]
    Publish { topic: String, message: String },
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("commit failed: {0}")]
    Commit(String),
}

impl BrokerError {
    pub fn publish(topic: &str, message: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.to_owned(),
            message: message.into(),
        }
    }
}

/// 从代理读取的一条原始记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait BrokerProducer: Send + Sync {
    /// 追加一条记录，相同键的记录进入同一分区
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait BrokerSubscription: Send {
    /// 等待下一条记录，订阅关闭时返回 `None`
    async fn next_record(&mut self) -> Option<Result<BrokerRecord, BrokerError>>;

    /// 提交该记录之后的偏移量
    async fn commit(&mut self, record: &BrokerRecord) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait BrokerSubscriber: Send + Sync {
    async fn subscribe(
        &self,
        topics: &[String],
        group: &str,
    ) -> Result<Box<dyn BrokerSubscription>, BrokerError>;
}

/// 三个逻辑消息流对应的主题名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTopics {
    pub messages: String,
    pub room_events: String,
    pub notifications: String,
}

impl EventTopics {
    pub fn topic_for(&self, stream: EventStream) -> &str {
        match stream {
            EventStream::Messages => &self.messages,
            EventStream::RoomEvents => &self.room_events,
            EventStream::Notifications => &self.notifications,
        }
    }

    /// 死信主题名
    pub fn dead_letter_topic(topic: &str) -> String {
        format!("{topic}.dlq")
    }
}

impl Default for EventTopics {
    fn default() -> Self {
        Self {
            messages: "chat-messages".to_owned(),
            room_events: "chat-room-events".to_owned(),
            notifications: "chat-notifications".to_owned(),
        }
    }
}
