use async_trait::async_trait;
use domain::{ChatRoom, Message, MessageId, RepositoryError, RoomId, User, UserId, Username};

/// 分页参数，页码从 0 开始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub const MAX_SIZE: u32 = 100;
    pub const DEFAULT_SIZE: u32 = 50;

    /// 页大小会被限制在 1 到 [`Self::MAX_SIZE`] 之间
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size: size.clamp(1, Self::MAX_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_SIZE)
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, RepositoryError>;
    async fn exists_by_id(&self, id: UserId) -> Result<bool, RepositoryError>;
    /// 用户名重复时返回 [`RepositoryError::Duplicate`]
    async fn save(&self, user: User) -> Result<User, RepositoryError>;
}

#[async_trait]
pub trait ChatRoomRepository: Send + Sync {
    async fn find_by_id(&self, id: RoomId) -> Result<Option<ChatRoom>, RepositoryError>;
    async fn exists_by_id(&self, id: RoomId) -> Result<bool, RepositoryError>;

    /// 原子保存房间及其参与者。
    ///
    /// `room.version` 必须与存储中的版本一致（新房间为 0），否则返回
    /// [`RepositoryError::Conflict`]。成功后返回递增了版本号的房间。
    async fn save(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError>;

    /// 删除房间，级联删除参与者与消息
    async fn delete(&self, id: RoomId) -> Result<(), RepositoryError>;

    async fn participant_exists(
        &self,
        user_id: UserId,
        room_id: RoomId,
    ) -> Result<bool, RepositoryError>;

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<ChatRoom>, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;
    async fn exists_by_id(&self, id: MessageId) -> Result<bool, RepositoryError>;
    /// 新增或覆盖消息
    async fn save(&self, message: Message) -> Result<Message, RepositoryError>;
    async fn delete(&self, id: MessageId) -> Result<(), RepositoryError>;

    /// 按时间倒序分页获取房间消息
    async fn find_by_room(
        &self,
        room_id: RoomId,
        page: PageRequest,
    ) -> Result<Vec<Message>, RepositoryError>;
}
