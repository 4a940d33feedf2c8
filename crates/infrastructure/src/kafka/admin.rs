use application::EventTopics;
use config::KafkaConfig;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::types::RDKafkaErrorCode;
use tracing::{info, warn};

use crate::kafka::{KafkaError, KafkaResult};

/// 创建事件主题及其死信主题，已存在的主题保持不变
pub async fn ensure_topics(config: &KafkaConfig, topics: &EventTopics) -> KafkaResult<()> {
    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .create()?;

    let mut names = Vec::new();
    for topic in [&topics.messages, &topics.room_events, &topics.notifications] {
        names.push(topic.clone());
        names.push(EventTopics::dead_letter_topic(topic));
    }

    let partitions = i32::try_from(config.partitions).map_err(|_| KafkaError::ConfigError {
        message: format!("分区数过大: {}", config.partitions),
    })?;
    let new_topics: Vec<NewTopic<'_>> = names
        .iter()
        .map(|name| NewTopic::new(name, partitions, TopicReplication::Fixed(1)))
        .collect();

    for result in admin.create_topics(&new_topics, &AdminOptions::new()).await? {
        match result {
            Ok(name) => info!(topic = %name, "Kafka 主题已创建"),
            Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                tracing::debug!(topic = %name, "Kafka 主题已存在");
            }
            Err((name, code)) => {
                warn!(topic = %name, code = ?code, "Kafka 主题创建失败");
                return Err(KafkaError::AdminError {
                    message: format!("创建主题 {name} 失败: {code:?}"),
                });
            }
        }
    }
    Ok(())
}
