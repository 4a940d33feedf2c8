use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::broker::{BrokerProducer, BrokerRecord, EventTopics};

/// 死信出口，处理失败或无法解码的记录交给它保存
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn dead_letter(&self, group: &str, record: &BrokerRecord, reason: &str);
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeadLetter<'a> {
    original_topic: &'a str,
    partition: i32,
    offset: i64,
    consumer_group: &'a str,
    reason: &'a str,
    payload: String,
}

/// 把死信写回代理的 `<topic>.dlq` 主题
pub struct BrokerDeadLetterSink {
    producer: Arc<dyn BrokerProducer>,
}

impl BrokerDeadLetterSink {
    pub fn new(producer: Arc<dyn BrokerProducer>) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl DeadLetterSink for BrokerDeadLetterSink {
    async fn dead_letter(&self, group: &str, record: &BrokerRecord, reason: &str) {
        let topic = EventTopics::dead_letter_topic(&record.topic);
        let key = record
            .key
            .clone()
            .unwrap_or_else(|| format!("{}-{}", record.partition, record.offset));
        let letter = DeadLetter {
            original_topic: &record.topic,
            partition: record.partition,
            offset: record.offset,
            consumer_group: group,
            reason,
            payload: String::from_utf8_lossy(&record.payload).into_owned(),
        };

        let payload = match serde_json::to_vec(&letter) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(topic = %topic, error = %err, "死信序列化失败");
                return;
            }
        };

        if let Err(err) = self.producer.publish(&topic, &key, payload).await {
            tracing::error!(
                topic = %topic,
                offset = record.offset,
                error = %err,
                "死信写入失败，记录已丢失"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::Value;

    use super::*;
    use crate::broker::BrokerError;

    #[derive(Default)]
    struct RecordingProducer {
        records: Mutex<Vec<(String, String, Vec<u8>)>>,
    }

    #[async_trait]
    impl BrokerProducer for RecordingProducer {
        async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
            self.records
                .lock()
                .unwrap()
                .push((topic.to_owned(), key.to_owned(), payload));
            Ok(())
        }
    }

    #[tokio::test]
    async fn dead_letter_is_published_to_dlq_topic() {
        let producer = Arc::new(RecordingProducer::default());
        let sink = BrokerDeadLetterSink::new(producer.clone());
        let record = BrokerRecord {
            topic: "chat-messages".to_owned(),
            partition: 2,
            offset: 41,
            key: Some("room-1".to_owned()),
            payload: b"garbage".to_vec(),
        };

        sink.dead_letter("chat-delivery", &record, "bad json").await;

        let records = producer.records.lock().unwrap();
        assert_eq!(records[0].0, "chat-messages.dlq");
        assert_eq!(records[0].1, "room-1");
        let letter: Value = serde_json::from_slice(&records[0].2).unwrap();
        assert_eq!(letter["originalTopic"], "chat-messages");
        assert_eq!(letter["offset"], 41);
        assert_eq!(letter["consumerGroup"], "chat-delivery");
        assert_eq!(letter["payload"], "garbage");
    }
}
