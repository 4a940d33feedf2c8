use std::sync::Arc;

use application::{
    BrokerProducer, BrokerSubscriber, ChatRoomRepository, EventTopics, MessageRepository,
    UserRepository,
};
use config::{AppConfig, KafkaConfig};
use thiserror::Error;

use crate::{
    broadcast::LocalTopicBroadcaster,
    broker::InMemoryBroker,
    memory::InMemoryStorage,
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    repository::{create_pg_pool, PgStorage},
    session::InMemorySessionStore,
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[cfg(feature = "kafka")]
    #[error("kafka error: {0}")]
    Kafka(#[from] crate::kafka::KafkaError),
    #[error("kafka is enabled in configuration but support was not compiled in")]
    KafkaUnavailable,
}

pub fn event_topics(config: &KafkaConfig) -> EventTopics {
    EventTopics {
        messages: config.topics.messages.clone(),
        room_events: config.topics.room_events.clone(),
        notifications: config.topics.notifications.clone(),
    }
}

/// 按配置装配的全部适配器
#[derive(Clone)]
pub struct Infrastructure {
    pub user_repository: Arc<dyn UserRepository>,
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub password_hasher: Arc<BcryptPasswordHasher>,
    pub broadcaster: Arc<LocalTopicBroadcaster>,
    pub session_store: Arc<InMemorySessionStore>,
    pub producer: Arc<dyn BrokerProducer>,
    pub subscriber: Arc<dyn BrokerSubscriber>,
    pub topics: EventTopics,
    /// 使用进程内代理时保留句柄，用于关闭
    pub local_broker: Option<InMemoryBroker>,
}

impl Infrastructure {
    /// 配置了数据库时连接 PostgreSQL 并执行迁移，否则使用内存仓储；
    /// 启用 Kafka 时连接 Kafka，否则使用进程内代理。
    pub async fn build(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let (user_repository, room_repository, message_repository) = match &config.database.url {
            Some(url) => {
                let pool = create_pg_pool(url, config.database.max_connections).await?;
                MIGRATOR.run(&pool).await?;
                tracing::info!("数据库连接成功，迁移已执行");
                let storage = PgStorage::new(pool);
                (
                    storage.user_repository as Arc<dyn UserRepository>,
                    storage.room_repository as Arc<dyn ChatRoomRepository>,
                    storage.message_repository as Arc<dyn MessageRepository>,
                )
            }
            None => {
                tracing::warn!("未配置数据库，使用内存仓储");
                let storage = Arc::new(InMemoryStorage::new());
                (
                    storage.clone() as Arc<dyn UserRepository>,
                    storage.clone() as Arc<dyn ChatRoomRepository>,
                    storage as Arc<dyn MessageRepository>,
                )
            }
        };

        let topics = event_topics(&config.kafka);
        let (producer, subscriber, local_broker) = Self::build_broker(&config.kafka, &topics).await?;

        Ok(Self {
            user_repository,
            room_repository,
            message_repository,
            password_hasher: Arc::new(BcryptPasswordHasher::new(config.server.bcrypt_cost)),
            broadcaster: Arc::new(LocalTopicBroadcaster::new(config.broadcast.capacity)),
            session_store: Arc::new(InMemorySessionStore::new()),
            producer,
            subscriber,
            topics,
            local_broker,
        })
    }

    #[cfg(feature = "kafka")]
    async fn build_broker(
        config: &KafkaConfig,
        topics: &EventTopics,
    ) -> Result<BrokerParts, InfrastructureError> {
        if !config.enabled {
            return Ok(Self::local_broker(config));
        }

        crate::kafka::ensure_topics(config, topics).await?;
        let producer = Arc::new(crate::kafka::KafkaBrokerProducer::new(config)?);
        let subscriber = Arc::new(crate::kafka::KafkaBrokerSubscriber::new(config));
        tracing::info!(brokers = %config.brokers, "使用 Kafka 消息代理");
        Ok((producer, subscriber, None))
    }

    #[cfg(not(feature = "kafka"))]
    async fn build_broker(
        config: &KafkaConfig,
        _topics: &EventTopics,
    ) -> Result<BrokerParts, InfrastructureError> {
        if config.enabled {
            return Err(InfrastructureError::KafkaUnavailable);
        }
        Ok(Self::local_broker(config))
    }

    fn local_broker(config: &KafkaConfig) -> BrokerParts {
        tracing::info!(partitions = config.partitions, "使用进程内消息代理");
        let broker = InMemoryBroker::new(config.partitions);
        (
            Arc::new(broker.clone()),
            Arc::new(broker.clone()),
            Some(broker),
        )
    }

    /// 关闭进程内代理，使所有订阅结束
    pub fn shutdown(&self) {
        if let Some(broker) = &self.local_broker {
            broker.close();
        }
    }
}

type BrokerParts = (
    Arc<dyn BrokerProducer>,
    Arc<dyn BrokerSubscriber>,
    Option<InMemoryBroker>,
);
