//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，负责在仓储保存成功后发布事件，
//! 并定义仓储、消息代理、主题广播、会话存储、令牌与密码哈希等外部适配器的端口。
//! 消费者组的处理逻辑与实时扇出服务也位于本层。

pub mod broadcaster;
pub mod broker;
pub mod clock;
pub mod consumers;
pub mod dto;
pub mod error;
pub mod fanout;
pub mod password;
pub mod publisher;
pub mod repository;
pub mod services;
pub mod session;
pub mod token;

pub use broadcaster::{room_topic, user_topic, ROOM_TOPIC_PREFIX, BroadcastError, TopicBroadcaster};
pub use broker::{
    BrokerError, BrokerProducer, BrokerRecord, BrokerSubscriber, BrokerSubscription, EventTopics,
};
pub use clock::{Clock, SystemClock};
pub use consumers::{
    dispatch, AnalyticsConsumer, AnalyticsSnapshot, BrokerDeadLetterSink, ChatEventHandler,
    ConsumedEvent, ConsumerError, ConsumerRunner, DeadLetterSink, DeliveryConsumer,
    NotificationConsumer, PersistenceVerificationConsumer,
};
pub use dto::{MessageDto, Page, ParticipantDto, RoomDto, UserDto};
pub use error::ApplicationError;
pub use fanout::{FanoutBatch, FanoutError, FanoutMessage, FanoutService};
pub use password::{PasswordHasher, PasswordHasherError};
pub use publisher::{ChannelEventPublisher, EventPublisher};
pub use repository::{ChatRoomRepository, MessageRepository, PageRequest, UserRepository};
pub use services::{
    Actor, ChatService, ChatServiceDependencies, CreateRoomRequest, LoginOutcome,
    RegisterUserRequest, SendMessageRequest, UserService, UserServiceDependencies,
};
pub use session::{SessionAttributes, SessionError, SessionStore};
pub use token::{IssuedToken, TokenError, TokenService, VerifiedToken};
