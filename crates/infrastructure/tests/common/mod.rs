#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use application::{
    Actor, BrokerRecord, BrokerSubscriber, BrokerSubscription, ChannelEventPublisher,
    ChatRoomRepository, ChatService, ChatServiceDependencies, EventTopics, SystemClock,
    UserRepository,
};
use chrono::Utc;
use domain::{ChatEvent, PasswordHash, User, UserId, Username};
use infrastructure::{InMemoryBroker, InMemoryStorage};
use tokio::task::JoinHandle;

pub struct Harness {
    pub storage: Arc<InMemoryStorage>,
    pub broker: InMemoryBroker,
    pub topics: EventTopics,
    pub publisher: ChannelEventPublisher,
    pub publisher_task: JoinHandle<()>,
    pub chat: ChatService,
}

impl Harness {
    pub fn new() -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        Self::with_rooms_and_storage(storage.clone(), storage)
    }

    /// 使用自定义的房间仓储（例如注入并发修改），其余仓储使用 `storage`
    pub fn with_rooms_and_storage(
        rooms: Arc<dyn ChatRoomRepository>,
        storage: Arc<InMemoryStorage>,
    ) -> Self {
        let broker = InMemoryBroker::new(4);
        let topics = EventTopics::default();
        let (publisher, publisher_task) =
            ChannelEventPublisher::spawn(Arc::new(broker.clone()), topics.clone());

        let chat = ChatService::new(ChatServiceDependencies {
            room_repository: rooms,
            message_repository: storage.clone(),
            user_repository: storage.clone(),
            clock: Arc::new(SystemClock),
            publisher: Arc::new(publisher.clone()),
        });

        Self {
            storage,
            broker,
            topics,
            publisher,
            publisher_task,
            chat,
        }
    }

    pub async fn user(&self, name: &str) -> Actor {
        let user = User::register(
            UserId::generate(),
            Username::parse(name).unwrap(),
            PasswordHash::new("$2b$04$placeholder").unwrap(),
            Utc::now(),
        );
        UserRepository::save(self.storage.as_ref(), user.clone())
            .await
            .unwrap();
        Actor::new(user.id, name)
    }

    pub async fn subscribe(&self, topics: &[&str], group: &str) -> Box<dyn BrokerSubscription> {
        let topics: Vec<String> = topics.iter().map(|t| (*t).to_owned()).collect();
        self.broker.subscribe(&topics, group).await.unwrap()
    }
}

pub async fn next_record(subscription: &mut Box<dyn BrokerSubscription>) -> BrokerRecord {
    tokio::time::timeout(Duration::from_secs(2), subscription.next_record())
        .await
        .expect("timed out waiting for record")
        .expect("subscription closed")
        .expect("receive failed")
}

pub async fn next_event(subscription: &mut Box<dyn BrokerSubscription>) -> ChatEvent {
    let record = next_record(subscription).await;
    serde_json::from_slice(&record.payload).unwrap()
}

pub async fn assert_idle(subscription: &mut Box<dyn BrokerSubscription>) {
    let next = tokio::time::timeout(Duration::from_millis(100), subscription.next_record()).await;
    assert!(next.is_err(), "unexpected record: {next:?}");
}
