//! 消费者组
//!
//! 每个消费者组实现 [`ChatEventHandler`]，事件类型与处理方法一一对应。
//! [`dispatch`] 对事件类型做穷尽匹配，新增事件类型时所有消费者都必须补上处理方法。
//! [`ConsumerRunner`] 驱动代理订阅：解码、分发、失败转入死信、无论成败都提交偏移量。

mod analytics;
mod dead_letter;
mod delivery;
mod notification;
mod persistence;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{ChatEvent, ChatEventKind, NotificationEvent, RepositoryError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::broker::{BrokerRecord, BrokerSubscription, EventTopics};
use crate::fanout::FanoutError;

pub use analytics::{AnalyticsConsumer, AnalyticsSnapshot};
pub use dead_letter::{BrokerDeadLetterSink, DeadLetterSink};
pub use delivery::DeliveryConsumer;
pub use notification::NotificationConsumer;
pub use persistence::PersistenceVerificationConsumer;

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("failed to decode record: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("fan-out failed: {0}")]
    Fanout(#[from] FanoutError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// 从代理解码出的事件
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumedEvent {
    Chat(ChatEvent),
    Notification(NotificationEvent),
}

impl ConsumedEvent {
    /// 通知主题上的记录按通知事件解码，其余按聊天事件解码
    pub fn decode(record: &BrokerRecord, topics: &EventTopics) -> Result<Self, serde_json::Error> {
        if record.topic == topics.notifications {
            serde_json::from_slice(&record.payload).map(ConsumedEvent::Notification)
        } else {
            serde_json::from_slice(&record.payload).map(ConsumedEvent::Chat)
        }
    }

    pub fn event_id(&self) -> &str {
        match self {
            ConsumedEvent::Chat(event) => &event.event_id,
            ConsumedEvent::Notification(notification) => &notification.event_id,
        }
    }
}

/// 消费者组的事件处理器，每种事件类型一个方法
#[async_trait]
pub trait ChatEventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_message_sent(&self, event: &ChatEvent) -> Result<(), ConsumerError>;
    async fn on_message_status_changed(&self, event: &ChatEvent) -> Result<(), ConsumerError>;
    async fn on_message_deleted(&self, event: &ChatEvent) -> Result<(), ConsumerError>;
    async fn on_user_joined(&self, event: &ChatEvent) -> Result<(), ConsumerError>;
    async fn on_user_left(&self, event: &ChatEvent) -> Result<(), ConsumerError>;
    async fn on_role_changed(&self, event: &ChatEvent) -> Result<(), ConsumerError>;
    async fn on_room_created(&self, event: &ChatEvent) -> Result<(), ConsumerError>;
    async fn on_room_deleted(&self, event: &ChatEvent) -> Result<(), ConsumerError>;
    async fn on_notification(&self, notification: &NotificationEvent) -> Result<(), ConsumerError>;
}

pub async fn dispatch<H>(handler: &H, event: &ConsumedEvent) -> Result<(), ConsumerError>
where
    H: ChatEventHandler + ?Sized,
{
    let event = match event {
        ConsumedEvent::Notification(notification) => {
            return handler.on_notification(notification).await
        }
        ConsumedEvent::Chat(event) => event,
    };

    match &event.kind {
        ChatEventKind::MessageSent { .. } => handler.on_message_sent(event).await,
        ChatEventKind::MessageStatusChanged { .. } => {
            handler.on_message_status_changed(event).await
        }
        ChatEventKind::MessageDeleted { .. } => handler.on_message_deleted(event).await,
        ChatEventKind::UserJoined { .. } => handler.on_user_joined(event).await,
        ChatEventKind::UserLeft { .. } => handler.on_user_left(event).await,
        ChatEventKind::RoleChanged { .. } => handler.on_role_changed(event).await,
        ChatEventKind::RoomCreated { .. } => handler.on_room_created(event).await,
        ChatEventKind::RoomDeleted { .. } => handler.on_room_deleted(event).await,
    }
}

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// 消费循环
pub struct ConsumerRunner {
    group: String,
    topics: EventTopics,
    dead_letters: Arc<dyn DeadLetterSink>,
}

impl ConsumerRunner {
    pub fn new(
        group: impl Into<String>,
        topics: EventTopics,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        Self {
            group: group.into(),
            topics,
            dead_letters,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// 持续消费直到订阅关闭或收到关闭信号
    pub async fn run(
        &self,
        mut subscription: Box<dyn BrokerSubscription>,
        handler: Arc<dyn ChatEventHandler>,
        shutdown: CancellationToken,
    ) {
        tracing::info!(group = %self.group, handler = handler.name(), "消费者已启动");
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = subscription.next_record() => next,
            };

            let record = match next {
                Some(Ok(record)) => record,
                Some(Err(err)) => {
                    tracing::warn!(group = %self.group, error = %err, "接收记录失败，稍后重试");
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
                None => {
                    tracing::info!(group = %self.group, "订阅已关闭");
                    break;
                }
            };
            backoff = INITIAL_BACKOFF;

            self.process(&record, handler.as_ref()).await;

            if let Err(err) = subscription.commit(&record).await {
                tracing::warn!(
                    group = %self.group,
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %err,
                    "提交偏移量失败"
                );
            }
        }

        tracing::info!(group = %self.group, "消费者已停止");
    }

    /// 处理单条记录，失败时转入死信。返回是否处理成功。
    pub async fn process(&self, record: &BrokerRecord, handler: &dyn ChatEventHandler) -> bool {
        let event = match ConsumedEvent::decode(record, &self.topics) {
            Ok(event) => event,
            Err(err) => {
                tracing::error!(
                    group = %self.group,
                    topic = %record.topic,
                    offset = record.offset,
                    error = %err,
                    "记录无法解码，转入死信"
                );
                self.dead_letters
                    .dead_letter(&self.group, record, &err.to_string())
                    .await;
                return false;
            }
        };

        match dispatch(handler, &event).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(
                    group = %self.group,
                    event_id = %event.event_id(),
                    topic = %record.topic,
                    offset = record.offset,
                    error = %err,
                    "事件处理失败，转入死信"
                );
                self.dead_letters
                    .dead_letter(&self.group, record, &err.to_string())
                    .await;
                false
            }
        }
    }
}
