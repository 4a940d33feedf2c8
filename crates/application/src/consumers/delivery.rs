use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{ChatEvent, NotificationEvent};
use tokio::sync::Mutex;

use super::{ChatEventHandler, ConsumerError};
use crate::fanout::FanoutService;

const DEFAULT_WINDOW: usize = 1024;

/// 最近处理过的事件 ID，超过容量时淘汰最早的
struct RecentEventIds {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl RecentEventIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    fn contains(&self, event_id: &str) -> bool {
        self.seen.contains(event_id)
    }

    fn remember(&mut self, event_id: &str) {
        if self.seen.contains(event_id) {
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(event_id.to_owned());
        self.seen.insert(event_id.to_owned());
    }
}

/// chat-delivery 组：把事件推送给在线连接
pub struct DeliveryConsumer {
    fanout: Arc<FanoutService>,
    recent: Mutex<RecentEventIds>,
}

impl DeliveryConsumer {
    pub fn new(fanout: Arc<FanoutService>) -> Self {
        Self::with_window(fanout, DEFAULT_WINDOW)
    }

    pub fn with_window(fanout: Arc<FanoutService>, window: usize) -> Self {
        Self {
            fanout,
            recent: Mutex::new(RecentEventIds::new(window.max(1))),
        }
    }

    async fn is_duplicate(&self, event_id: &str) -> bool {
        let duplicate = self.recent.lock().await.contains(event_id);
        if duplicate {
            tracing::debug!(event_id = %event_id, "重复投递的事件，已跳过");
        }
        duplicate
    }

    /// 只有推送成功的事件才计入去重窗口，失败后重放仍会推送
    async fn delivered(&self, event_id: &str) {
        self.recent.lock().await.remember(event_id);
    }

    async fn forward(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        if self.is_duplicate(&event.event_id).await {
            return Ok(());
        }
        self.fanout.deliver(event).await?;
        self.delivered(&event.event_id).await;
        Ok(())
    }
}

#[async_trait]
impl ChatEventHandler for DeliveryConsumer {
    fn name(&self) -> &'static str {
        "delivery"
    }

    async fn on_message_sent(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.forward(event).await
    }

    async fn on_message_status_changed(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.forward(event).await
    }

    async fn on_message_deleted(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.forward(event).await
    }

    async fn on_user_joined(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.forward(event).await
    }

    async fn on_user_left(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.forward(event).await
    }

    async fn on_role_changed(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.forward(event).await
    }

    async fn on_room_created(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.forward(event).await
    }

    async fn on_room_deleted(&self, event: &ChatEvent) -> Result<(), ConsumerError> {
        self.forward(event).await
    }

    async fn on_notification(&self, notification: &NotificationEvent) -> Result<(), ConsumerError> {
        if self.is_duplicate(&notification.event_id).await {
            return Ok(());
        }
        self.fanout.deliver_notification(notification).await?;
        self.delivered(&notification.event_id).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    use chrono::Utc;
    use domain::{RoomId, UserId};

    use super::*;
    use crate::broadcaster::{BroadcastError, TopicBroadcaster};
    use crate::consumers::{dispatch, ConsumedEvent};

    #[derive(Default)]
    struct CountingBroadcaster {
        topics: StdMutex<Vec<String>>,
        /// 为 true 时下一次广播失败
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl TopicBroadcaster for CountingBroadcaster {
        async fn broadcast(&self, topic: &str, _payload: String) -> Result<usize, BroadcastError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(BroadcastError::failed("connection registry unavailable"));
            }
            self.topics.lock().unwrap().push(topic.to_owned());
            Ok(0)
        }
    }

    #[tokio::test]
    async fn redelivered_event_is_pushed_once() {
        let broadcaster = Arc::new(CountingBroadcaster::default());
        let consumer = DeliveryConsumer::new(Arc::new(FanoutService::new(broadcaster.clone())));
        let event = ConsumedEvent::Chat(ChatEvent::user_joined(
            RoomId::generate(),
            UserId::generate(),
            "kim",
            Utc::now(),
        ));

        dispatch(&consumer, &event).await.unwrap();
        dispatch(&consumer, &event).await.unwrap();

        assert_eq!(broadcaster.topics.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn window_evicts_oldest_ids() {
        let broadcaster = Arc::new(CountingBroadcaster::default());
        let consumer =
            DeliveryConsumer::with_window(Arc::new(FanoutService::new(broadcaster.clone())), 1);
        let room_id = RoomId::generate();
        let user = UserId::generate();
        let first = ChatEvent::user_joined(room_id, user, "lee", Utc::now());
        let second = ChatEvent::user_left(room_id, user, "lee", Utc::now());

        consumer.on_user_joined(&first).await.unwrap();
        consumer.on_user_left(&second).await.unwrap();
        consumer.on_user_joined(&first).await.unwrap();

        assert_eq!(broadcaster.topics.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn failed_delivery_is_pushed_when_replayed() {
        let broadcaster = Arc::new(CountingBroadcaster::default());
        let consumer = DeliveryConsumer::new(Arc::new(FanoutService::new(broadcaster.clone())));
        let event = ChatEvent::user_joined(RoomId::generate(), UserId::generate(), "ana", Utc::now());

        broadcaster.fail_next.store(true, Ordering::SeqCst);
        assert!(consumer.on_user_joined(&event).await.is_err());
        assert!(broadcaster.topics.lock().unwrap().is_empty());

        consumer.on_user_joined(&event).await.unwrap();
        consumer.on_user_joined(&event).await.unwrap();
        assert_eq!(broadcaster.topics.lock().unwrap().len(), 1);
    }

    #[test]
    fn recent_ids_evict_oldest() {
        let mut recent = RecentEventIds::new(2);
        recent.remember("a");
        recent.remember("a");
        recent.remember("b");
        assert!(recent.contains("a") && recent.contains("b"));
        recent.remember("c");
        assert!(!recent.contains("a"));
        assert!(recent.contains("b") && recent.contains("c"));
    }
}
