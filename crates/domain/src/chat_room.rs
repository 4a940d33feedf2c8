//! 聊天室聚合
//!
//! 聚合根持有按加入顺序排列的参与者列表，参与者只保存房间 ID 作为普通值。
//! 聚合内部只维护结构不变量，权限检查由领域服务完成。

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{RoomId, RoomName, Timestamp, UserId};

/// 单个房间的参与者上限。
pub const MAX_PARTICIPANTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomType {
    Group,
    Private,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Group => "GROUP",
            RoomType::Private => "PRIVATE",
        }
    }
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GROUP" => Ok(RoomType::Group),
            "PRIVATE" => Ok(RoomType::Private),
            other => Err(DomainError::invalid_argument(
                "room_type",
                format!("unknown room type {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantRole {
    Admin,
    Member,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Admin => "ADMIN",
            ParticipantRole::Member => "MEMBER",
        }
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(ParticipantRole::Admin),
            "MEMBER" => Ok(ParticipantRole::Member),
            other => Err(DomainError::invalid_argument(
                "role",
                format!("unknown role {other}"),
            )),
        }
    }
}

/// 房间参与者。相等性只由 (user_id, room_id) 决定。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: ParticipantRole,
    pub joined_at: Timestamp,
    pub notifications_enabled: bool,
}

impl Participant {
    pub fn new(room_id: RoomId, user_id: UserId, role: ParticipantRole, joined_at: Timestamp) -> Self {
        Self {
            room_id,
            user_id,
            role,
            joined_at,
            notifications_enabled: true,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ParticipantRole::Admin
    }
}

impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.user_id == other.user_id && self.room_id == other.room_id
    }
}

impl Eq for Participant {}

impl Hash for Participant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.user_id.hash(state);
        self.room_id.hash(state);
    }
}

/// 聊天室聚合根。
///
/// 不变量：
/// - 参与者数量不超过 [`MAX_PARTICIPANTS`]
/// - 房间非空时至少有一位管理员
/// - 同一用户最多出现一次
#[derive(Debug, Clone)]
pub struct ChatRoom {
    pub id: RoomId,
    pub name: RoomName,
    pub room_type: RoomType,
    pub created_at: Timestamp,
    /// 乐观锁版本号，新建房间为 0，由仓储在保存时递增
    pub version: i64,
    participants: Vec<Participant>,
}

impl ChatRoom {
    /// 创建房间，创建者成为唯一的管理员。
    pub fn create(
        id: RoomId,
        name: RoomName,
        room_type: RoomType,
        creator: UserId,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            name,
            room_type,
            created_at: now,
            version: 0,
            participants: vec![Participant::new(id, creator, ParticipantRole::Admin, now)],
        }
    }

    /// 从存储中恢复房间，重新校验结构不变量。
    pub fn restore(
        id: RoomId,
        name: RoomName,
        room_type: RoomType,
        created_at: Timestamp,
        version: i64,
        participants: Vec<Participant>,
    ) -> Result<Self, DomainError> {
        if participants.len() > MAX_PARTICIPANTS {
            return Err(DomainError::invalid_argument(
                "participants",
                "stored room exceeds participant limit",
            ));
        }
        for (index, participant) in participants.iter().enumerate() {
            if participant.room_id != id {
                return Err(DomainError::invalid_argument(
                    "participants",
                    "participant belongs to another room",
                ));
            }
            if participants[..index].contains(participant) {
                return Err(DomainError::invalid_argument(
                    "participants",
                    "duplicate participant",
                ));
            }
        }
        if !participants.is_empty() && !participants.iter().any(Participant::is_admin) {
            return Err(DomainError::invalid_argument(
                "participants",
                "stored room has no admin",
            ));
        }

        Ok(Self {
            id,
            name,
            room_type,
            created_at,
            version,
            participants,
        })
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, user_id: UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participant(user_id).is_some()
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.participant(user_id).is_some_and(Participant::is_admin)
    }

    pub fn admin_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_admin()).count()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// 添加参与者；空房间的第一位参与者总是成为管理员
    pub fn add_participant(
        &mut self,
        user_id: UserId,
        role: ParticipantRole,
        joined_at: Timestamp,
    ) -> Result<&Participant, DomainError> {
        if self.is_participant(user_id) {
            return Err(DomainError::AlreadyJoined);
        }
        if self.participants.len() >= MAX_PARTICIPANTS {
            return Err(DomainError::RoomFull {
                limit: MAX_PARTICIPANTS,
            });
        }

        let role = if self.participants.is_empty() {
            ParticipantRole::Admin
        } else {
            role
        };
        self.participants
            .push(Participant::new(self.id, user_id, role, joined_at));
        let index = self.participants.len() - 1;
        Ok(&self.participants[index])
    }

    /// 移除参与者。
    ///
    /// 若被移除者是最后一位管理员且房间仍有其他人，先把最早加入的参与者
    /// 提升为管理员（加入时间相同时按列表顺序），返回被提升的用户。
    pub fn remove_participant(&mut self, user_id: UserId) -> Result<Option<UserId>, DomainError> {
        let index = self
            .participants
            .iter()
            .position(|p| p.user_id == user_id)
            .ok_or(DomainError::ParticipantNotFound)?;

        let mut promoted = None;
        if self.participants[index].is_admin() && self.admin_count() == 1 {
            let successor = self
                .participants
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .min_by_key(|(_, p)| p.joined_at)
                .map(|(i, _)| i);

            if let Some(successor) = successor {
                self.participants[successor].role = ParticipantRole::Admin;
                promoted = Some(self.participants[successor].user_id);
            }
        }

        self.participants.remove(index);
        Ok(promoted)
    }

    pub fn change_participant_role(
        &mut self,
        user_id: UserId,
        new_role: ParticipantRole,
    ) -> Result<(), DomainError> {
        let demotes_last_admin = new_role == ParticipantRole::Member && self.admin_count() == 1;
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or(DomainError::ParticipantNotFound)?;

        if participant.role == new_role {
            return Ok(());
        }
        if participant.is_admin() && demotes_last_admin {
            return Err(DomainError::LastAdmin);
        }

        participant.role = new_role;
        Ok(())
    }

    pub fn change_name(&mut self, name: RoomName) {
        self.name = name;
    }

    pub fn set_notifications(&mut self, user_id: UserId, enabled: bool) -> Result<(), DomainError> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or(DomainError::ParticipantNotFound)?;
        participant.notifications_enabled = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn t(seconds: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(seconds)
    }

    fn room_with_creator(creator: UserId) -> ChatRoom {
        ChatRoom::create(
            RoomId::generate(),
            RoomName::parse("general").unwrap(),
            RoomType::Group,
            creator,
            t(0),
        )
    }

    #[test]
    fn creator_is_sole_admin() {
        let creator = UserId::generate();
        let room = room_with_creator(creator);
        assert_eq!(room.participant_count(), 1);
        assert!(room.is_admin(creator));
        assert_eq!(room.admin_count(), 1);
        assert_eq!(room.version, 0);
    }

    #[test]
    fn hundred_and_first_participant_is_rejected() {
        let mut room = room_with_creator(UserId::generate());
        for i in 1..MAX_PARTICIPANTS {
            room.add_participant(UserId::generate(), ParticipantRole::Member, t(i as i64))
                .unwrap();
        }
        assert_eq!(room.participant_count(), MAX_PARTICIPANTS);

        let err = room
            .add_participant(UserId::generate(), ParticipantRole::Member, t(1000))
            .unwrap_err();
        assert_eq!(err, DomainError::RoomFull { limit: MAX_PARTICIPANTS });
        assert_eq!(room.participant_count(), MAX_PARTICIPANTS);
    }

    #[test]
    fn duplicate_join_is_rejected() {
        let creator = UserId::generate();
        let mut room = room_with_creator(creator);
        let err = room
            .add_participant(creator, ParticipantRole::Member, t(1))
            .unwrap_err();
        assert_eq!(err, DomainError::AlreadyJoined);
    }

    #[test]
    fn removing_last_admin_promotes_earliest_joined() {
        let admin = UserId::generate();
        let early = UserId::generate();
        let late = UserId::generate();
        let mut room = room_with_creator(admin);
        room.add_participant(late, ParticipantRole::Member, t(20)).unwrap();
        room.add_participant(early, ParticipantRole::Member, t(10)).unwrap();

        let promoted = room.remove_participant(admin).unwrap();

        assert_eq!(promoted, Some(early));
        assert!(room.is_admin(early));
        assert!(!room.is_admin(late));
        assert_eq!(room.admin_count(), 1);
    }

    #[test]
    fn succession_ties_follow_insertion_order() {
        let admin = UserId::generate();
        let first = UserId::generate();
        let second = UserId::generate();
        let mut room = room_with_creator(admin);
        room.add_participant(first, ParticipantRole::Member, t(5)).unwrap();
        room.add_participant(second, ParticipantRole::Member, t(5)).unwrap();

        assert_eq!(room.remove_participant(admin).unwrap(), Some(first));
    }

    #[test]
    fn removing_admin_with_other_admin_promotes_nobody() {
        let admin = UserId::generate();
        let other_admin = UserId::generate();
        let member = UserId::generate();
        let mut room = room_with_creator(admin);
        room.add_participant(member, ParticipantRole::Member, t(1)).unwrap();
        room.add_participant(other_admin, ParticipantRole::Admin, t(2)).unwrap();

        assert_eq!(room.remove_participant(admin).unwrap(), None);
        assert!(!room.is_admin(member));
        assert_eq!(room.admin_count(), 1);
    }

    #[test]
    fn last_admin_leaving_alone_empties_room() {
        let admin = UserId::generate();
        let mut room = room_with_creator(admin);
        assert_eq!(room.remove_participant(admin).unwrap(), None);
        assert!(room.is_empty());
    }

    #[test]
    fn first_participant_of_emptied_room_becomes_admin() {
        let admin = UserId::generate();
        let joiner = UserId::generate();
        let mut room = room_with_creator(admin);
        room.remove_participant(admin).unwrap();

        let joined = room.add_participant(joiner, ParticipantRole::Member, t(5)).unwrap();
        assert_eq!(joined.role, ParticipantRole::Admin);
        assert!(room.is_admin(joiner));
        assert_eq!(room.admin_count(), 1);
    }

    #[test]
    fn admin_presence_holds_after_every_removal() {
        let users: Vec<UserId> = (0..6).map(|_| UserId::generate()).collect();
        let mut room = room_with_creator(users[0]);
        for (i, user) in users.iter().enumerate().skip(1) {
            room.add_participant(*user, ParticipantRole::Member, t(i as i64)).unwrap();
        }

        for user in &users {
            room.remove_participant(*user).unwrap();
            assert!(room.is_empty() || room.admin_count() >= 1);
        }
    }

    #[test]
    fn removing_unknown_participant_fails() {
        let mut room = room_with_creator(UserId::generate());
        assert_eq!(
            room.remove_participant(UserId::generate()).unwrap_err(),
            DomainError::ParticipantNotFound
        );
    }

    #[test]
    fn last_admin_cannot_be_demoted() {
        let admin = UserId::generate();
        let mut room = room_with_creator(admin);
        room.add_participant(UserId::generate(), ParticipantRole::Member, t(1)).unwrap();

        let err = room
            .change_participant_role(admin, ParticipantRole::Member)
            .unwrap_err();
        assert_eq!(err, DomainError::LastAdmin);
        assert!(room.is_admin(admin));
    }

    #[test]
    fn admin_can_be_demoted_when_another_admin_exists() {
        let admin = UserId::generate();
        let member = UserId::generate();
        let mut room = room_with_creator(admin);
        room.add_participant(member, ParticipantRole::Member, t(1)).unwrap();
        room.change_participant_role(member, ParticipantRole::Admin).unwrap();

        room.change_participant_role(admin, ParticipantRole::Member).unwrap();
        assert!(!room.is_admin(admin));
        assert!(room.is_admin(member));
    }

    #[test]
    fn restore_rejects_duplicates_and_missing_admin() {
        let id = RoomId::generate();
        let user = UserId::generate();
        let name = RoomName::parse("restored").unwrap();

        let duplicate = vec![
            Participant::new(id, user, ParticipantRole::Admin, t(0)),
            Participant::new(id, user, ParticipantRole::Member, t(1)),
        ];
        assert!(ChatRoom::restore(id, name.clone(), RoomType::Group, t(0), 3, duplicate).is_err());

        let headless = vec![Participant::new(id, user, ParticipantRole::Member, t(0))];
        assert!(ChatRoom::restore(id, name.clone(), RoomType::Group, t(0), 3, headless).is_err());

        let room = ChatRoom::restore(id, name, RoomType::Private, t(0), 3, Vec::new()).unwrap();
        assert_eq!(room.version, 3);
        assert!(room.is_empty());
    }

    #[test]
    fn participant_equality_ignores_role() {
        let room_id = RoomId::generate();
        let user = UserId::generate();
        let a = Participant::new(room_id, user, ParticipantRole::Admin, t(0));
        let b = Participant::new(room_id, user, ParticipantRole::Member, t(9));
        assert_eq!(a, b);
    }
}
