//! 事件发布
//!
//! 用例服务在仓储保存成功后调用 [`EventPublisher::publish`]，该调用只把事件放入
//! 无界通道，不会阻塞也不会失败。后台任务独占代理生产者，按顺序序列化并发送，
//! 失败只记录日志。单个后台任务保证了同一房间的事件按提交顺序进入代理。

use std::sync::Arc;

use domain::{ChatEvent, EventStream, NotificationEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::broker::{BrokerProducer, EventTopics};

pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: ChatEvent);
    fn publish_notification(&self, notification: NotificationEvent);
}

#[derive(Debug)]
enum Outbound {
    Chat(ChatEvent),
    Notification(NotificationEvent),
}

/// 基于通道的发布器，克隆后共享同一个后台任务
#[derive(Clone)]
pub struct ChannelEventPublisher {
    sender: mpsc::UnboundedSender<Outbound>,
}

impl ChannelEventPublisher {
    /// 启动后台发送任务。所有发布器句柄被丢弃后，任务在发送完剩余事件后退出。
    pub fn spawn(producer: Arc<dyn BrokerProducer>, topics: EventTopics) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_outbound_worker(receiver, producer, topics));
        (Self { sender }, handle)
    }

    fn enqueue(&self, outbound: Outbound) {
        if let Err(err) = self.sender.send(outbound) {
            tracing::error!(event = ?err.0, "事件发布任务已停止，事件被丢弃");
        }
    }
}

impl EventPublisher for ChannelEventPublisher {
    fn publish(&self, event: ChatEvent) {
        self.enqueue(Outbound::Chat(event));
    }

    fn publish_notification(&self, notification: NotificationEvent) {
        self.enqueue(Outbound::Notification(notification));
    }
}

async fn run_outbound_worker(
    mut receiver: mpsc::UnboundedReceiver<Outbound>,
    producer: Arc<dyn BrokerProducer>,
    topics: EventTopics,
) {
    tracing::info!("事件发布任务已启动");

    while let Some(outbound) = receiver.recv().await {
        let (topic, key, event_id, payload) = match &outbound {
            Outbound::Chat(event) => (
                topics.topic_for(event.stream()),
                event.partition_key(),
                event.event_id.as_str(),
                serde_json::to_vec(event),
            ),
            Outbound::Notification(notification) => (
                topics.topic_for(EventStream::Notifications),
                notification.partition_key(),
                notification.event_id.as_str(),
                serde_json::to_vec(notification),
            ),
        };

        let payload = match payload {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(event_id = %event_id, error = %err, "事件序列化失败");
                continue;
            }
        };

        match producer.publish(topic, &key, payload).await {
            Ok(()) => {
                tracing::debug!(topic = %topic, key = %key, event_id = %event_id, "事件已发送");
            }
            Err(err) => {
                tracing::error!(
                    topic = %topic,
                    key = %key,
                    event_id = %event_id,
                    error = %err,
                    "事件发送失败"
                );
            }
        }
    }

    tracing::info!("事件发布任务已退出");
}
