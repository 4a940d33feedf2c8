//! Kafka 消息生产者

use std::time::Duration;

use application::{BrokerError, BrokerProducer};
use async_trait::async_trait;
use config::KafkaConfig;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::kafka::{KafkaError, KafkaResult};

pub struct KafkaBrokerProducer {
    producer: FutureProducer,
    send_timeout: Duration,
    retry_count: u32,
}

impl KafkaBrokerProducer {
    pub fn new(config: &KafkaConfig) -> KafkaResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.send_timeout_ms.to_string())
            .set("acks", "all")
            .set("enable.idempotence", "true") // 幂等生产，重试不产生重复
            .set("max.in.flight.requests.per.connection", "5")
            .set("compression.type", "snappy")
            .create()
            .map_err(|e| KafkaError::ConfigError {
                message: format!("创建 Kafka 生产者失败: {}", e),
            })?;

        info!("Kafka 生产者创建成功，连接到: {}", config.brokers);

        Ok(Self {
            producer,
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            retry_count: config.retry_count,
        })
    }

    /// 刷新生产者缓冲区，关闭前调用
    pub fn flush(&self, timeout: Duration) -> KafkaResult<()> {
        self.producer
            .flush(Timeout::After(timeout))
            .map_err(KafkaError::from)
    }
}

#[async_trait]
impl BrokerProducer for KafkaBrokerProducer {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let mut attempt = 0;
        loop {
            let record = FutureRecord::to(topic).payload(&payload).key(key);
            match self
                .producer
                .send(record, Timeout::After(self.send_timeout))
                .await
            {
                Ok(_) => {
                    if attempt > 0 {
                        info!(topic = %topic, key = %key, attempt, "重试后发送成功");
                    }
                    return Ok(());
                }
                Err((kafka_err, _)) if attempt < self.retry_count => {
                    warn!(
                        topic = %topic,
                        key = %key,
                        attempt = attempt + 1,
                        error = %kafka_err,
                        "发送失败，准备重试"
                    );
                    // 指数退避
                    sleep(Duration::from_millis(100 * 2_u64.pow(attempt))).await;
                    attempt += 1;
                }
                Err((kafka_err, _)) => {
                    error!(topic = %topic, key = %key, error = %kafka_err, "发送失败，已达最大重试次数");
                    return Err(BrokerError::publish(topic, kafka_err.to_string()));
                }
            }
        }
    }
}

impl Drop for KafkaBrokerProducer {
    fn drop(&mut self) {
        if let Err(err) = self.producer.flush(Timeout::After(Duration::from_secs(5))) {
            warn!(error = %err, "关闭时刷新 Kafka 生产者缓冲区失败");
        }
        info!("Kafka 生产者正在关闭");
    }
}
