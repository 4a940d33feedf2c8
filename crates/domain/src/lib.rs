//! 聊天室系统核心领域模型
//!
//! 包含聊天室聚合、消息聚合、用户实体、领域策略服务以及对外发布的事件记录。

pub mod chat_room;
pub mod errors;
pub mod events;
pub mod message;
pub mod services;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use chat_room::*;
pub use errors::*;
pub use events::*;
pub use message::*;
pub use services::*;
pub use user::*;
pub use value_objects::*;
