use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{ChatEvent, ChatEventType, NotificationEvent, RoomId};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{ChatEventHandler, ConsumerError};

/// 计数器快照
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyticsSnapshot {
    pub total: u64,
    pub by_type: BTreeMap<ChatEventType, u64>,
    pub by_room: HashMap<RoomId, u64>,
}

impl AnalyticsSnapshot {
    pub fn count(&self, event_type: ChatEventType) -> u64 {
        self.by_type.get(&event_type).copied().unwrap_or(0)
    }
}

/// chat-analytics 组：按事件类型与房间计数，尽力而为
#[derive(Default)]
pub struct AnalyticsConsumer {
    counters: RwLock<AnalyticsSnapshot>,
}

impl AnalyticsConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> AnalyticsSnapshot {
        self.counters.read().await.clone()
    }

    /// 定期输出统计摘要
    pub fn spawn_reporter(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let consumer = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let snapshot = consumer.snapshot().await;
                        tracing::info!(
                            total = snapshot.total,
                            rooms = snapshot.by_room.len(),
                            messages = snapshot.count(ChatEventType::MessageSent),
                            joins = snapshot.count(ChatEventType::UserJoined),
                            "事件统计摘要"
                        );
                    }
                }
            }
        })
    }

    async fn record(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        let mut counters = self.counters.write().await;
        counters.total += 1;
        *counters.by_type.entry(event.event_type()).or_insert(0) += 1;
        *counters.by_room.entry(event.chat_room_id).or_insert(0) += 1;
        Ok(())
    }
}

#[async_trait]
impl ChatEventHandler for AnalyticsConsumer {
    fn name(&self) -> &'static str {
        "analytics"
    }

    async fn on_message_sent(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.record(event).await
    }

    async fn on_message_status_changed(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.record(event).await
    }

    async fn on_message_deleted(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.record(event).await
    }

    async fn on_user_joined(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.record(event).await
    }

    async fn on_user_left(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.record(event).await
    }

    async fn on_role_changed(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.record(event).await
    }

    async fn on_room_created(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.record(event).await
    }

    async fn on_room_deleted(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.record(event).await
    }

    async fn on_notification(&self, _notification: &NotificationEvent) -> Result<(), ConsumerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use domain::UserId;

    use super::*;

    #[tokio::test]
    async fn counts_per_type_and_room() {
        let consumer = AnalyticsConsumer::new();
        let room_a = RoomId::generate();
        let room_b = RoomId::generate();
        let user = UserId::generate();

        consumer
            .on_user_joined(&ChatEvent::user_joined(room_a, user, "max", Utc::now()))
            .await
            .unwrap();
        consumer
            .on_user_joined(&ChatEvent::user_joined(room_b, user, "max", Utc::now()))
            .await
            .unwrap();
        consumer
            .on_user_left(&ChatEvent::user_left(room_a, user, "max", Utc::now()))
            .await
            .unwrap();

        let snapshot = consumer.snapshot().await;
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.count(ChatEventType::UserJoined), 2);
        assert_eq!(snapshot.count(ChatEventType::UserLeft), 1);
        assert_eq!(snapshot.by_room[&room_a], 2);
        assert_eq!(snapshot.by_room[&room_b], 1);
    }
}
