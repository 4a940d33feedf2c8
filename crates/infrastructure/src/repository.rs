//! PostgreSQL 仓储实现
//!
//! 房间与参与者在同一事务中保存，`chat_rooms.version` 作为乐观锁版本号。

use std::collections::HashMap;
use std::sync::Arc;

use application::{ChatRoomRepository, MessageRepository, PageRequest, UserRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ChatRoom, Message, MessageContent, MessageId, MessageStatus, Participant, ParticipantRole,
    PasswordHash, RepositoryError, RoomId, RoomName, RoomType, User, UserId, Username,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return RepositoryError::Duplicate {
                constraint: db_err.constraint().unwrap_or("unique").to_owned(),
            };
        }
    }
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

pub async fn create_pg_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let username = Username::parse(value.username).map_err(|err| invalid_data(err.to_string()))?;
        let password =
            PasswordHash::new(value.password_hash).map_err(|err| invalid_data(err.to_string()))?;

        Ok(User {
            id: UserId::from(value.id),
            username,
            password,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: Uuid,
    name: String,
    room_type: String,
    created_at: DateTime<Utc>,
    version: i64,
}

#[derive(Debug, FromRow)]
struct ParticipantRecord {
    room_id: Uuid,
    user_id: Uuid,
    role: String,
    joined_at: DateTime<Utc>,
    notifications_enabled: bool,
}

impl TryFrom<ParticipantRecord> for Participant {
    type Error = RepositoryError;

    fn try_from(value: ParticipantRecord) -> Result<Self, Self::Error> {
        let role: ParticipantRole = value
            .role
            .parse()
            .map_err(|err: domain::DomainError| invalid_data(err.to_string()))?;
        let mut participant = Participant::new(
            RoomId::from(value.room_id),
            UserId::from(value.user_id),
            role,
            value.joined_at,
        );
        participant.notifications_enabled = value.notifications_enabled;
        Ok(participant)
    }
}

fn restore_room(
    record: RoomRecord,
    participants: Vec<ParticipantRecord>,
) -> Result<ChatRoom, RepositoryError> {
    let name = RoomName::parse(record.name).map_err(|err| invalid_data(err.to_string()))?;
    let room_type: RoomType = record
        .room_type
        .parse()
        .map_err(|err: domain::DomainError| invalid_data(err.to_string()))?;
    let participants = participants
        .into_iter()
        .map(Participant::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    ChatRoom::restore(
        RoomId::from(record.id),
        name,
        room_type,
        record.created_at,
        record.version,
        participants,
    )
    .map_err(|err| invalid_data(err.to_string()))
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    room_id: Uuid,
    sender_id: Uuid,
    content: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let content = MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        let status: MessageStatus = value
            .status
            .parse()
            .map_err(|err: domain::DomainError| invalid_data(err.to_string()))?;

        Ok(Message::restore(
            MessageId::from(value.id),
            RoomId::from(value.room_id),
            UserId::from(value.sender_id),
            content,
            status,
            value.created_at,
        ))
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = $1",
        )
        .bind(username.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn exists_by_id(&self, id: UserId) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(Uuid::from(id))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)
    }

    async fn save(&self, user: User) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, username, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
                SET username = EXCLUDED.username,
                    password_hash = EXCLUDED.password_hash
            RETURNING id, username, password_hash, created_at
            "#,
        )
        .bind(Uuid::from(user.id))
        .bind(user.username.as_str())
        .bind(user.password.as_str())
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        User::try_from(record)
    }
}

#[derive(Clone)]
pub struct PgChatRoomRepository {
    pool: PgPool,
}

impl PgChatRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_participants(
        &self,
        room_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<ParticipantRecord>>, RepositoryError> {
        let records = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT room_id, user_id, role, joined_at, notifications_enabled
            FROM room_participants
            WHERE room_id = ANY($1)
            ORDER BY joined_at ASC, seq ASC
            "#,
        )
        .bind(room_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let mut grouped: HashMap<Uuid, Vec<ParticipantRecord>> = HashMap::new();
        for record in records {
            grouped.entry(record.room_id).or_default().push(record);
        }
        Ok(grouped)
    }

    async fn write_participants(
        tx: &mut Transaction<'_, Postgres>,
        room: &ChatRoom,
    ) -> Result<(), RepositoryError> {
        let room_id = Uuid::from(room.id);
        let current: Vec<Uuid> = room
            .participants()
            .iter()
            .map(|participant| Uuid::from(participant.user_id))
            .collect();

        sqlx::query("DELETE FROM room_participants WHERE room_id = $1 AND NOT (user_id = ANY($2))")
            .bind(room_id)
            .bind(&current)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_err)?;

        for participant in room.participants() {
            sqlx::query(
                r#"
                INSERT INTO room_participants (room_id, user_id, role, joined_at, notifications_enabled)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (room_id, user_id) DO UPDATE
                    SET role = EXCLUDED.role,
                        notifications_enabled = EXCLUDED.notifications_enabled
                "#,
            )
            .bind(room_id)
            .bind(Uuid::from(participant.user_id))
            .bind(participant.role.as_str())
            .bind(participant.joined_at)
            .bind(participant.notifications_enabled)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChatRoomRepository for PgChatRoomRepository {
    async fn find_by_id(&self, id: RoomId) -> Result<Option<ChatRoom>, RepositoryError> {
        let record = sqlx::query_as::<_, RoomRecord>(
            "SELECT id, name, room_type, created_at, version FROM chat_rooms WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let Some(record) = record else {
            return Ok(None);
        };
        let mut participants = self.load_participants(&[record.id]).await?;
        let participants = participants.remove(&record.id).unwrap_or_default();
        restore_room(record, participants).map(Some)
    }

    async fn exists_by_id(&self, id: RoomId) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM chat_rooms WHERE id = $1)")
            .bind(Uuid::from(id))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)
    }

    async fn save(&self, mut room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        let room_id = Uuid::from(room.id);
        let next_version = room.version + 1;

        if room.version == 0 {
            sqlx::query(
                r#"
                INSERT INTO chat_rooms (id, name, room_type, created_at, version)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(room_id)
            .bind(room.name.as_str())
            .bind(room.room_type.as_str())
            .bind(room.created_at)
            .bind(next_version)
            .execute(&mut *tx)
            .await
            .map_err(|err| match map_sqlx_err(err) {
                RepositoryError::Duplicate { .. } => RepositoryError::Conflict,
                other => other,
            })?;
        } else {
            let updated = sqlx::query(
                r#"
                UPDATE chat_rooms
                SET name = $2, room_type = $3, version = $4
                WHERE id = $1 AND version = $5
                "#,
            )
            .bind(room_id)
            .bind(room.name.as_str())
            .bind(room.room_type.as_str())
            .bind(next_version)
            .bind(room.version)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

            if updated.rows_affected() == 0 {
                let exists =
                    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM chat_rooms WHERE id = $1)")
                        .bind(room_id)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(map_sqlx_err)?;
                return Err(if exists {
                    RepositoryError::Conflict
                } else {
                    RepositoryError::NotFound
                });
            }
        }

        Self::write_participants(&mut tx, &room).await?;
        tx.commit().await.map_err(map_sqlx_err)?;

        room.version = next_version;
        Ok(room)
    }

    async fn delete(&self, id: RoomId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM chat_rooms WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn participant_exists(&self, user_id: UserId, room_id: RoomId) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM room_participants WHERE room_id = $1 AND user_id = $2)",
        )
        .bind(Uuid::from(room_id))
        .bind(Uuid::from(user_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<ChatRoom>, RepositoryError> {
        let records = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT r.id, r.name, r.room_type, r.created_at, r.version
            FROM chat_rooms r
            JOIN room_participants p ON p.room_id = r.id
            WHERE p.user_id = $1
            ORDER BY r.created_at ASC
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let room_ids: Vec<Uuid> = records.iter().map(|record| record.id).collect();
        let mut participants = self.load_participants(&room_ids).await?;

        records
            .into_iter()
            .map(|record| {
                let members = participants.remove(&record.id).unwrap_or_default();
                restore_room(record, members)
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            "SELECT id, room_id, sender_id, content, status, created_at FROM messages WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }

    async fn exists_by_id(&self, id: MessageId) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM messages WHERE id = $1)")
            .bind(Uuid::from(id))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)
    }

    async fn save(&self, message: Message) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (id, room_id, sender_id, content, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
                SET content = EXCLUDED.content,
                    status = EXCLUDED.status
            RETURNING id, room_id, sender_id, content, status, created_at
            "#,
        )
        .bind(Uuid::from(message.id()))
        .bind(Uuid::from(message.room_id()))
        .bind(Uuid::from(message.sender_id()))
        .bind(message.content().as_str())
        .bind(message.status().as_str())
        .bind(message.created_at())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn delete(&self, id: MessageId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find_by_room(
        &self,
        room_id: RoomId,
        page: PageRequest,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, room_id, sender_id, content, status, created_at
            FROM messages
            WHERE room_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(i64::from(page.size))
        .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }
}

/// 三个仓储共享同一个连接池
#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub user_repository: Arc<PgUserRepository>,
    pub room_repository: Arc<PgChatRoomRepository>,
    pub message_repository: Arc<PgMessageRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            room_repository: Arc::new(PgChatRoomRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            pool,
        }
    }
}
