//! 领域服务定义
//!
//! 房间成员与消息操作的权限规则，每条规则失败时返回独立的错误变体。

pub mod membership;
pub mod message_policy;

// 重新导出服务
pub use membership::*;
pub use message_policy::*;
