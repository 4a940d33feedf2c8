//! 进程内消息代理
//!
//! 未启用 Kafka 时使用。每个主题按键哈希分为固定数量的分区，分区内只追加；
//! 消费者组各自保存已提交的偏移量，重新订阅时从已提交位置继续读取。
//! 同一消费者组同一时刻只应有一个订阅。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use application::{BrokerError, BrokerProducer, BrokerRecord, BrokerSubscriber, BrokerSubscription};
use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

struct BrokerState {
    partitions: usize,
    /// 主题 -> 分区 -> 记录
    logs: Mutex<HashMap<String, Vec<Vec<BrokerRecord>>>>,
    /// (消费者组, 主题) -> 每个分区下一条待读取的偏移量
    committed: Mutex<HashMap<(String, String), Vec<i64>>>,
    appended: Notify,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    pub fn new(partitions: u32) -> Self {
        Self {
            state: Arc::new(BrokerState {
                partitions: partitions.max(1) as usize,
                logs: Mutex::new(HashMap::new()),
                committed: Mutex::new(HashMap::new()),
                appended: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn partition_count(&self) -> usize {
        self.state.partitions
    }

    /// 相同键总是落到同一分区
    pub fn partition_for(&self, key: &str) -> usize {
        let hash = key
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
                (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
            });
        (hash % self.state.partitions as u64) as usize
    }

    /// 按分区顺序返回主题内的全部记录
    pub async fn records(&self, topic: &str) -> Vec<BrokerRecord> {
        let logs = self.state.logs.lock().await;
        logs.get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// 关闭代理，所有订阅的 `next_record` 返回 `None`
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.appended.notify_waiters();
    }
}

#[async_trait]
impl BrokerProducer for InMemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::publish(topic, "broker closed"));
        }

        let partition = self.partition_for(key);
        {
            let mut logs = self.state.logs.lock().await;
            let partitions = logs
                .entry(topic.to_owned())
                .or_insert_with(|| vec![Vec::new(); self.state.partitions]);
            let log = &mut partitions[partition];
            log.push(BrokerRecord {
                topic: topic.to_owned(),
                partition: partition as i32,
                offset: log.len() as i64,
                key: Some(key.to_owned()),
                payload,
            });
        }
        self.state.appended.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl BrokerSubscriber for InMemoryBroker {
    async fn subscribe(
        &self,
        topics: &[String],
        group: &str,
    ) -> Result<Box<dyn BrokerSubscription>, BrokerError> {
        if topics.is_empty() {
            return Err(BrokerError::Subscribe("no topics given".to_owned()));
        }

        let committed = self.state.committed.lock().await;
        let positions = topics
            .iter()
            .map(|topic| {
                committed
                    .get(&(group.to_owned(), topic.clone()))
                    .cloned()
                    .unwrap_or_else(|| vec![0; self.state.partitions])
            })
            .collect();
        tracing::debug!(group = %group, topics = ?topics, "进程内代理订阅已建立");

        Ok(Box::new(InMemorySubscription {
            state: self.state.clone(),
            group: group.to_owned(),
            topics: topics.to_vec(),
            positions,
            cursor: 0,
        }))
    }
}

struct InMemorySubscription {
    state: Arc<BrokerState>,
    group: String,
    topics: Vec<String>,
    /// 与 `topics` 对应的每个分区读取位置
    positions: Vec<Vec<i64>>,
    /// 轮询起点，避免单个分区饿死其他分区
    cursor: usize,
}

impl InMemorySubscription {
    async fn poll(&mut self) -> Option<BrokerRecord> {
        let logs = self.state.logs.lock().await;
        let slots = self.topics.len() * self.state.partitions;

        for step in 0..slots {
            let slot = (self.cursor + step) % slots;
            let (topic_index, partition) = (slot / self.state.partitions, slot % self.state.partitions);
            let Some(partitions) = logs.get(&self.topics[topic_index]) else {
                continue;
            };
            let position = self.positions[topic_index][partition];
            if let Some(record) = partitions[partition].get(position as usize) {
                self.positions[topic_index][partition] = position + 1;
                self.cursor = slot + 1;
                return Some(record.clone());
            }
        }
        None
    }
}

#[async_trait]
impl BrokerSubscription for InMemorySubscription {
    async fn next_record(&mut self) -> Option<Result<BrokerRecord, BrokerError>> {
        let state = Arc::clone(&self.state);
        loop {
            let appended = state.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if state.closed.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(record) = self.poll().await {
                return Some(Ok(record));
            }
            appended.await;
        }
    }

    async fn commit(&mut self, record: &BrokerRecord) -> Result<(), BrokerError> {
        let partition = usize::try_from(record.partition)
            .ok()
            .filter(|partition| *partition < self.state.partitions)
            .ok_or_else(|| BrokerError::Commit(format!("unknown partition {}", record.partition)))?;

        let mut committed = self.state.committed.lock().await;
        let offsets = committed
            .entry((self.group.clone(), record.topic.clone()))
            .or_insert_with(|| vec![0; self.state.partitions]);
        offsets[partition] = offsets[partition].max(record.offset + 1);
        Ok(())
    }
}
