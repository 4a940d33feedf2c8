use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_identifier!(
    /// 用户唯一标识。
    UserId
);
uuid_identifier!(
    /// 聊天室唯一标识。
    RoomId
);
uuid_identifier!(
    /// 消息唯一标识。
    MessageId
);

/// 经过验证的用户名，去除首尾空白后长度为 3 到 50 个字符。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Username(String);

impl Username {
    pub const MIN_LEN: usize = 3;
    pub const MAX_LEN: usize = 50;

    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        let len = value.chars().count();
        if len < Self::MIN_LEN {
            return Err(DomainError::invalid_argument(
                "username",
                format!("must be at least {} characters", Self::MIN_LEN),
            ));
        }
        if len > Self::MAX_LEN {
            return Err(DomainError::invalid_argument("username", "too long"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 聊天室名称。
///
/// 去除首尾空白后长度为 2 到 100 个字符，且不得包含 `< > " ' &`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomName(String);

impl RoomName {
    pub const MIN_LEN: usize = 2;
    pub const MAX_LEN: usize = 100;
    const FORBIDDEN: [char; 5] = ['<', '>', '"', '\'', '&'];

    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        let len = value.chars().count();
        if len < Self::MIN_LEN {
            return Err(DomainError::invalid_argument(
                "room_name",
                format!("must be at least {} characters", Self::MIN_LEN),
            ));
        }
        if len > Self::MAX_LEN {
            return Err(DomainError::invalid_argument("room_name", "too long"));
        }
        if value.contains(Self::FORBIDDEN) {
            return Err(DomainError::invalid_argument(
                "room_name",
                "contains forbidden characters",
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 经过外部服务生成的密码哈希。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let hash = value.into();
        if hash.trim().is_empty() {
            return Err(DomainError::invalid_argument(
                "password_hash",
                "cannot be empty",
            ));
        }
        Ok(Self(hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 消息正文内容，1 到 1000 个字符且不能全为空白。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent(String);

impl MessageContent {
    pub const MAX_LEN: usize = 1000;

    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::invalid_argument(
                "message_content",
                "cannot be empty",
            ));
        }
        if value.chars().count() > Self::MAX_LEN {
            return Err(DomainError::invalid_argument(
                "message_content",
                format!("cannot exceed {} characters", Self::MAX_LEN),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_name_is_trimmed_and_bounded() {
        let name = RoomName::parse("  general  ").unwrap();
        assert_eq!(name.as_str(), "general");

        assert!(RoomName::parse(" a ").is_err());
        assert!(RoomName::parse("x".repeat(101)).is_err());
        assert!(RoomName::parse("x".repeat(100)).is_ok());
    }

    #[test]
    fn room_name_rejects_markup_characters() {
        for bad in ["<b>room", "tom & jerry", "it's", "say \"hi\""] {
            let err = RoomName::parse(bad).unwrap_err();
            assert!(matches!(err, DomainError::InvalidArgument { field: "room_name", .. }));
        }
    }

    #[test]
    fn message_content_limits() {
        assert!(MessageContent::new("   ").is_err());
        assert!(MessageContent::new("").is_err());
        assert!(MessageContent::new("a".repeat(1000)).is_ok());
        assert!(MessageContent::new("a".repeat(1001)).is_err());
        // 多字节字符按字符计数
        assert!(MessageContent::new("你".repeat(1000)).is_ok());
    }

    #[test]
    fn username_length_bounds() {
        assert!(Username::parse("ab").is_err());
        assert_eq!(Username::parse(" alice ").unwrap().as_str(), "alice");
        assert!(Username::parse("a".repeat(51)).is_err());
    }

    #[test]
    fn identifiers_parse_from_strings() {
        let id = RoomId::generate();
        let parsed: RoomId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<UserId>().is_err());
    }
}
