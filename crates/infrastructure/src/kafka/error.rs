//! Kafka 错误类型定义

use thiserror::Error;

/// Kafka 客户端创建与管理错误
#[derive(Error, Debug)]
pub enum KafkaError {
    /// 配置错误
    #[error("Kafka 配置错误: {message}")]
    ConfigError { message: String },

    /// 连接错误
    #[error("Kafka 连接错误: {message}")]
    ConnectionError { message: String },

    /// 主题管理错误
    #[error("Kafka 主题管理错误: {message}")]
    AdminError { message: String },
}

pub type KafkaResult<T> = Result<T, KafkaError>;

impl From<rdkafka::error::KafkaError> for KafkaError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        match err {
            rdkafka::error::KafkaError::ClientConfig(..) | rdkafka::error::KafkaError::ClientCreation(_) => {
                KafkaError::ConfigError {
                    message: err.to_string(),
                }
            }
            rdkafka::error::KafkaError::AdminOp(_) | rdkafka::error::KafkaError::AdminOpCreation(_) => {
                KafkaError::AdminError {
                    message: err.to_string(),
                }
            }
            _ => KafkaError::ConnectionError {
                message: err.to_string(),
            },
        }
    }
}
