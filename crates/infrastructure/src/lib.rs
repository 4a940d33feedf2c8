//! 基础设施层实现。
//!
//! 提供仓储、消息代理、主题广播、会话存储与密码哈希等适配器，实现应用层定义的端口。

pub mod broadcast;
pub mod broker;
pub mod builder;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod migrations;
pub mod password;
pub mod repository;
pub mod session;

pub use broadcast::LocalTopicBroadcaster;
pub use broker::InMemoryBroker;
pub use builder::{event_topics, Infrastructure, InfrastructureError};
pub use memory::InMemoryStorage;
pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{
    create_pg_pool, PgChatRoomRepository, PgMessageRepository, PgStorage, PgUserRepository,
};
pub use session::InMemorySessionStore;
