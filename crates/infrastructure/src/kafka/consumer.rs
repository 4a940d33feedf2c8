//! Kafka 消费者组订阅

use application::{BrokerError, BrokerRecord, BrokerSubscriber, BrokerSubscription};
use async_trait::async_trait;
use config::KafkaConfig;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::Offset;
use tracing::info;

/// 为每个消费者组创建独立的 `StreamConsumer`
#[derive(Debug, Clone)]
pub struct KafkaBrokerSubscriber {
    brokers: String,
}

impl KafkaBrokerSubscriber {
    pub fn new(config: &KafkaConfig) -> Self {
        Self {
            brokers: config.brokers.clone(),
        }
    }
}

#[async_trait]
impl BrokerSubscriber for KafkaBrokerSubscriber {
    async fn subscribe(
        &self,
        topics: &[String],
        group: &str,
    ) -> Result<Box<dyn BrokerSubscription>, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", group)
            .set("bootstrap.servers", &self.brokers)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "10000")
            .set("heartbeat.interval.ms", "3000")
            .set("enable.auto.commit", "false") // 处理完成后手动提交
            .set("auto.offset.reset", "earliest")
            .set("fetch.wait.max.ms", "100")
            .create()
            .map_err(|e| BrokerError::Subscribe(format!("创建 Kafka 消费者失败: {e}")))?;

        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&names)
            .map_err(|e| BrokerError::Subscribe(format!("订阅主题失败: {e}")))?;

        info!(group = %group, topics = ?topics, "Kafka 消费者组已订阅");
        Ok(Box::new(KafkaSubscription { consumer }))
    }
}

struct KafkaSubscription {
    consumer: StreamConsumer,
}

#[async_trait]
impl BrokerSubscription for KafkaSubscription {
    async fn next_record(&mut self) -> Option<Result<BrokerRecord, BrokerError>> {
        let result = match self.consumer.recv().await {
            Ok(message) => Ok(BrokerRecord {
                topic: message.topic().to_owned(),
                partition: message.partition(),
                offset: message.offset(),
                key: message
                    .key()
                    .map(|key| String::from_utf8_lossy(key).into_owned()),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            }),
            Err(err) => Err(BrokerError::Receive(err.to_string())),
        };
        Some(result)
    }

    async fn commit(&mut self, record: &BrokerRecord) -> Result<(), BrokerError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&record.topic, record.partition, Offset::Offset(record.offset + 1))
            .map_err(|e| BrokerError::Commit(e.to_string()))?;
        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| BrokerError::Commit(e.to_string()))
    }
}
