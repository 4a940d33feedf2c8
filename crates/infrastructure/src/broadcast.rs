use std::collections::HashMap;

use application::{BroadcastError, TopicBroadcaster};
use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

/// 单进程内的主题广播器，每个主题对应一个 broadcast 通道
pub struct LocalTopicBroadcaster {
    capacity: usize,
    topics: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl LocalTopicBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        if let Some(sender) = self.topics.read().await.get(topic) {
            return sender.subscribe();
        }

        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }

    /// 回收已没有订阅者的主题
    pub async fn prune(&self) -> usize {
        let mut topics = self.topics.write().await;
        let before = topics.len();
        topics.retain(|_, sender| sender.receiver_count() > 0);
        before - topics.len()
    }
}

#[async_trait]
impl TopicBroadcaster for LocalTopicBroadcaster {
    async fn broadcast(&self, topic: &str, payload: String) -> Result<usize, BroadcastError> {
        let topics = self.topics.read().await;
        let Some(sender) = topics.get(topic) else {
            return Ok(0);
        };
        if sender.receiver_count() == 0 {
            return Ok(0);
        }
        sender
            .send(payload)
            .map_err(|err| BroadcastError::failed(err.to_string()))
    }
}
