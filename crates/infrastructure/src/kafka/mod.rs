//! Kafka 代理适配器
//!
//! 以房间 ID（通知为接收者 ID）作为分区键，保证同一房间事件有序。
//! 消费端关闭自动提交，由消费者运行器在处理完成后逐条提交。

pub mod admin;
pub mod consumer;
pub mod error;
pub mod producer;

pub use admin::ensure_topics;
pub use consumer::KafkaBrokerSubscriber;
pub use error::{KafkaError, KafkaResult};
pub use producer::KafkaBrokerProducer;
