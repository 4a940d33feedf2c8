//! 领域模型错误定义
//!
//! 每条业务规则对应一个独立的错误变体，调用方通过 [`DomainError::kind`]
//! 映射到稳定的错误分类。

use std::fmt;

use thiserror::Error;

/// 错误分类，供上层映射为 HTTP 状态码或错误帧。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    AlreadyExists,
    CapacityExceeded,
    InvalidState,
    Validation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::CapacityExceeded => "CAPACITY_EXCEEDED",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::Validation => "VALIDATION_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 需要房间管理员身份的操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminAction {
    InviteUser,
    RemoveParticipant,
    ChangeRole,
    RenameRoom,
    DeleteRoom,
}

impl fmt::Display for AdminAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            AdminAction::InviteUser => "invite users",
            AdminAction::RemoveParticipant => "remove other participants",
            AdminAction::ChangeRole => "change participant roles",
            AdminAction::RenameRoom => "rename the room",
            AdminAction::DeleteRoom => "delete the room",
        };
        f.write_str(action)
    }
}

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 值对象校验失败
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error("user not found")]
    UserNotFound,

    #[error("room not found")]
    RoomNotFound,

    #[error("message not found")]
    MessageNotFound,

    /// 目标用户不是房间成员
    #[error("user is not a participant of the room")]
    ParticipantNotFound,

    #[error("user already joined the room")]
    AlreadyJoined,

    #[error("username already taken")]
    UsernameTaken,

    /// 房间人数已达上限
    #[error("room is full (limit {limit})")]
    RoomFull { limit: usize },

    /// 非管理员尝试执行管理操作
    #[error("only a room admin may {action}")]
    AdminRequired { action: AdminAction },

    #[error("cannot change own role")]
    CannotChangeOwnRole,

    /// 只有发送者可以修改消息状态
    #[error("only the sender may update the message")]
    NotMessageSender,

    /// 只有发送者或房间管理员可以删除消息
    #[error("only the sender or a room admin may delete the message")]
    CannotDeleteMessage,

    /// 发送者在构造消息时已不在房间内
    #[error("sender is not a participant of the room")]
    SenderNotParticipant,

    /// 已删除的消息不能再变更状态
    #[error("message is deleted")]
    MessageDeleted,

    /// 不能降级房间内最后一位管理员
    #[error("cannot demote the last admin of the room")]
    LastAdmin,
}

impl DomainError {
    /// 创建参数校验错误
    pub fn invalid_argument(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }

    pub fn admin_required(action: AdminAction) -> Self {
        Self::AdminRequired { action }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::InvalidArgument { .. } => ErrorKind::Validation,
            DomainError::UserNotFound
            | DomainError::RoomNotFound
            | DomainError::MessageNotFound
            | DomainError::ParticipantNotFound => ErrorKind::NotFound,
            DomainError::AlreadyJoined | DomainError::UsernameTaken => ErrorKind::AlreadyExists,
            DomainError::RoomFull { .. } => ErrorKind::CapacityExceeded,
            DomainError::AdminRequired { .. }
            | DomainError::CannotChangeOwnRole
            | DomainError::NotMessageSender
            | DomainError::CannotDeleteMessage => ErrorKind::PermissionDenied,
            DomainError::SenderNotParticipant
            | DomainError::MessageDeleted
            | DomainError::LastAdmin => ErrorKind::InvalidState,
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 仓储层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    /// 乐观锁版本冲突，调用方应重新加载后重试
    #[error("concurrent modification conflict")]
    Conflict,

    #[error("unique constraint violated: {constraint}")]
    Duplicate { constraint: String },

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_rules_map_to_permission_denied() {
        assert_eq!(
            DomainError::admin_required(AdminAction::InviteUser).kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(DomainError::CannotChangeOwnRole.kind(), ErrorKind::PermissionDenied);
        assert_eq!(DomainError::CannotDeleteMessage.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn state_rules_map_to_invalid_state() {
        assert_eq!(DomainError::SenderNotParticipant.kind(), ErrorKind::InvalidState);
        assert_eq!(DomainError::MessageDeleted.kind(), ErrorKind::InvalidState);
        assert_eq!(DomainError::LastAdmin.kind(), ErrorKind::InvalidState);
        assert_eq!(DomainError::RoomFull { limit: 100 }.kind(), ErrorKind::CapacityExceeded);
    }

    #[test]
    fn admin_required_message_names_the_action() {
        let err = DomainError::admin_required(AdminAction::ChangeRole);
        assert_eq!(err.to_string(), "only a room admin may change participant roles");
    }
}
