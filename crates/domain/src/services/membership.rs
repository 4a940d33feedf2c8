//! 房间成员管理规则
//!
//! 聚合只保证结构不变量，谁能做什么由这里决定。

use crate::chat_room::{ChatRoom, ParticipantRole};
use crate::errors::{AdminAction, DomainError, DomainResult};
use crate::value_objects::{Timestamp, UserId};

/// 移除成员的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removal {
    pub removed: UserId,
    /// 因管理员继任而被提升的成员
    pub promoted: Option<UserId>,
    /// 成员自行离开（而非被管理员移除）
    pub self_leave: bool,
}

pub struct MembershipService;

impl MembershipService {
    /// 用户自行加入房间，只受容量与重复加入约束
    pub fn join_room(room: &mut ChatRoom, user_id: UserId, now: Timestamp) -> DomainResult<()> {
        room.add_participant(user_id, ParticipantRole::Member, now)?;
        Ok(())
    }

    /// 管理员邀请用户加入
    pub fn invite_user(
        room: &mut ChatRoom,
        invitee: UserId,
        inviter: UserId,
        now: Timestamp,
    ) -> DomainResult<()> {
        Self::require_admin(room, inviter, AdminAction::InviteUser)?;
        room.add_participant(invitee, ParticipantRole::Member, now)?;
        Ok(())
    }

    /// 移除成员：本人离开或由管理员移除
    pub fn remove_user(
        room: &mut ChatRoom,
        target: UserId,
        requestor: UserId,
    ) -> DomainResult<Removal> {
        let self_leave = target == requestor;
        if !self_leave {
            Self::require_admin(room, requestor, AdminAction::RemoveParticipant)?;
        }

        let promoted = room.remove_participant(target)?;
        Ok(Removal {
            removed: target,
            promoted,
            self_leave,
        })
    }

    pub fn change_participant_role(
        room: &mut ChatRoom,
        target: UserId,
        new_role: ParticipantRole,
        requestor: UserId,
    ) -> DomainResult<()> {
        Self::require_admin(room, requestor, AdminAction::ChangeRole)?;
        if target == requestor {
            return Err(DomainError::CannotChangeOwnRole);
        }
        room.change_participant_role(target, new_role)
    }

    pub fn ensure_can_rename_room(room: &ChatRoom, requestor: UserId) -> DomainResult<()> {
        Self::require_admin(room, requestor, AdminAction::RenameRoom)
    }

    pub fn ensure_can_delete_room(room: &ChatRoom, requestor: UserId) -> DomainResult<()> {
        Self::require_admin(room, requestor, AdminAction::DeleteRoom)
    }

    fn require_admin(room: &ChatRoom, user_id: UserId, action: AdminAction) -> DomainResult<()> {
        if room.is_admin(user_id) {
            Ok(())
        } else {
            Err(DomainError::admin_required(action))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::chat_room::RoomType;
    use crate::errors::ErrorKind;
    use crate::value_objects::{RoomId, RoomName};

    fn setup() -> (ChatRoom, UserId, UserId) {
        let admin = UserId::generate();
        let member = UserId::generate();
        let mut room = ChatRoom::create(
            RoomId::generate(),
            RoomName::parse("team").unwrap(),
            RoomType::Group,
            admin,
            Utc::now(),
        );
        MembershipService::join_room(&mut room, member, Utc::now()).unwrap();
        (room, admin, member)
    }

    #[test]
    fn member_cannot_invite() {
        let (mut room, _, member) = setup();
        let err = MembershipService::invite_user(&mut room, UserId::generate(), member, Utc::now())
            .unwrap_err();
        assert_eq!(err, DomainError::admin_required(AdminAction::InviteUser));
        assert_eq!(room.participant_count(), 2);
    }

    #[test]
    fn admin_invites_as_member() {
        let (mut room, admin, _) = setup();
        let invitee = UserId::generate();
        MembershipService::invite_user(&mut room, invitee, admin, Utc::now()).unwrap();
        assert_eq!(
            room.participant(invitee).map(|p| p.role),
            Some(ParticipantRole::Member)
        );
    }

    #[test]
    fn member_may_leave_but_not_remove_others() {
        let (mut room, admin, member) = setup();
        let err = MembershipService::remove_user(&mut room, admin, member).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let removal = MembershipService::remove_user(&mut room, member, member).unwrap();
        assert!(removal.self_leave);
        assert_eq!(removal.promoted, None);
        assert!(!room.is_participant(member));
    }

    #[test]
    fn admin_leaving_promotes_successor() {
        let (mut room, admin, member) = setup();
        let removal = MembershipService::remove_user(&mut room, admin, admin).unwrap();
        assert_eq!(removal.promoted, Some(member));
        assert!(room.is_admin(member));
    }

    #[test]
    fn admin_cannot_change_own_role() {
        let (mut room, admin, _) = setup();
        let err = MembershipService::change_participant_role(
            &mut room,
            admin,
            ParticipantRole::Member,
            admin,
        )
        .unwrap_err();
        assert_eq!(err, DomainError::CannotChangeOwnRole);
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(room.is_admin(admin));
    }

    #[test]
    fn member_cannot_change_roles() {
        let (mut room, admin, member) = setup();
        let err = MembershipService::change_participant_role(
            &mut room,
            admin,
            ParticipantRole::Member,
            member,
        )
        .unwrap_err();
        assert_eq!(err, DomainError::admin_required(AdminAction::ChangeRole));
    }

    #[test]
    fn admin_promotes_member() {
        let (mut room, admin, member) = setup();
        MembershipService::change_participant_role(&mut room, member, ParticipantRole::Admin, admin)
            .unwrap();
        assert_eq!(room.admin_count(), 2);
    }

    #[test]
    fn only_admin_may_rename_or_delete() {
        let (room, admin, member) = setup();
        assert!(MembershipService::ensure_can_rename_room(&room, admin).is_ok());
        assert!(MembershipService::ensure_can_delete_room(&room, admin).is_ok());
        assert_eq!(
            MembershipService::ensure_can_delete_room(&room, member).unwrap_err(),
            DomainError::admin_required(AdminAction::DeleteRoom)
        );
    }
}
