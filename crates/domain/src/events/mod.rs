//! 领域事件定义
//!
//! 聊天事件在事务提交后发布，通知事件由通知消费者按接收者派生。

pub mod chat_event;
pub mod notification_event;

// 重新导出事件类型
pub use chat_event::*;
pub use notification_event::*;
