//! Room registry: membership, capacity, visibility, invitations.
//!
//! Everything here is synchronous in-memory bookkeeping; the lobby
//! layer brackets calls with its room lock and performs all delivery
//! afterwards. Rules enforced by this module:
//!
//! - a room never holds more than two players
//! - a private room admits only invited users or existing members
//! - exactly one player is host; when the host leaves and players
//!   remain, the first remaining player inherits the role
//! - a room with zero players and zero pending invites is deleted
//!   immediately by whichever operation empties it

use crate::error::LobbyError;
use log::info;
use shared::{GameId, RoomEntry, RoomStatus, Visibility};
use std::collections::HashMap;
use uuid::Uuid;

pub const ROOM_CAPACITY: usize = 2;

#[derive(Debug, Clone)]
pub struct Room {
    pub room_id: String,
    pub creator: String,
    pub host: String,
    pub visibility: Visibility,
    pub game: GameId,
    pub status: RoomStatus,
    pub players: Vec<String>,
    pub invited_users: Vec<String>,
}

impl Room {
    fn entry(&self) -> RoomEntry {
        RoomEntry {
            room_id: self.room_id.clone(),
            creator: self.creator.clone(),
            host: self.host.clone(),
            game: self.game,
            status: self.status,
            visibility: self.visibility,
        }
    }

    fn is_empty(&self) -> bool {
        self.players.is_empty() && self.invited_users.is_empty()
    }
}

/// Result of a player leaving their room, by any path.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaveOutcome {
    pub room_id: String,
    /// Set when the host role moved to a remaining player.
    pub new_host: Option<String>,
    /// Players still in the room after the leave.
    pub remaining: Vec<String>,
    pub deleted: bool,
}

/// Result of declining an invitation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclineOutcome {
    pub was_invited: bool,
    pub room_deleted: bool,
}

/// Everything the handoff broker needs once a game starts.
#[derive(Debug, Clone, PartialEq)]
pub struct StartInfo {
    pub room_id: String,
    pub game: GameId,
    pub host: String,
    pub guest: String,
}

#[derive(Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// The room a user currently plays in, if any.
    pub fn room_of(&self, username: &str) -> Option<&Room> {
        self.rooms
            .values()
            .find(|room| room.players.iter().any(|p| p == username))
    }

    /// Creates a room with the creator as sole player and host.
    pub fn create(
        &mut self,
        creator: &str,
        visibility: Visibility,
        game: GameId,
    ) -> Result<&Room, LobbyError> {
        if self.room_of(creator).is_some() {
            return Err(LobbyError::AlreadyInRoom);
        }
        let room_id = Uuid::new_v4().to_string();
        let room = Room {
            room_id: room_id.clone(),
            creator: creator.to_string(),
            host: creator.to_string(),
            visibility,
            game,
            status: RoomStatus::Waiting,
            players: vec![creator.to_string()],
            invited_users: Vec::new(),
        };
        info!("User {} created {} room {}", creator, visibility, room_id);
        Ok(self.rooms.entry(room_id).or_insert(room))
    }

    /// Adds a player to a room. Invited users joining a private room
    /// directly are admitted and their invitation is consumed.
    pub fn join(&mut self, room_id: &str, username: &str) -> Result<GameId, LobbyError> {
        if self.room_of(username).is_some() {
            return Err(LobbyError::AlreadyInRoom);
        }
        let room = self.rooms.get_mut(room_id).ok_or(LobbyError::RoomNotFound)?;
        if room.status == RoomStatus::InGame {
            return Err(LobbyError::RoomInGame);
        }
        if room.players.len() >= ROOM_CAPACITY {
            return Err(LobbyError::RoomFull);
        }
        if room.visibility == Visibility::Private
            && !room.invited_users.iter().any(|u| u == username)
        {
            return Err(LobbyError::PrivateRoomForbidden);
        }
        room.invited_users.retain(|u| u != username);
        room.players.push(username.to_string());
        if room.players.len() == 1 {
            room.host = username.to_string();
        }
        info!("User {} joined room {}", username, room_id);
        Ok(room.game)
    }

    /// Records an invitation. Target liveness/idleness is the session
    /// registry's concern and is checked by the caller.
    pub fn invite(
        &mut self,
        host: &str,
        target: &str,
        room_id: &str,
    ) -> Result<GameId, LobbyError> {
        let room = self.rooms.get_mut(room_id).ok_or(LobbyError::RoomNotFound)?;
        if room.host != host {
            return Err(LobbyError::NotHost);
        }
        if room.visibility != Visibility::Private {
            return Err(LobbyError::RoomNotPrivate);
        }
        if room.players.len() >= ROOM_CAPACITY {
            return Err(LobbyError::RoomFull);
        }
        if room.invited_users.iter().any(|u| u == target) {
            return Err(LobbyError::AlreadyInvited(target.to_string()));
        }
        if room.players.iter().any(|p| p == target) {
            return Err(LobbyError::AlreadyInRoom);
        }
        room.invited_users.push(target.to_string());
        info!("User {} invited {} to room {}", host, target, room_id);
        Ok(room.game)
    }

    /// Resolves an invitation by acceptance: the target moves from the
    /// invite list into the player list. Accepting into a room whose
    /// players all left makes the acceptor host.
    pub fn accept(&mut self, target: &str, room_id: &str) -> Result<GameId, LobbyError> {
        if self.room_of(target).is_some() {
            return Err(LobbyError::AlreadyInRoom);
        }
        let room = self.rooms.get_mut(room_id).ok_or(LobbyError::RoomNotFound)?;
        if room.status == RoomStatus::InGame {
            return Err(LobbyError::RoomInGame);
        }
        if room.players.len() >= ROOM_CAPACITY {
            return Err(LobbyError::RoomFull);
        }
        if room.visibility != Visibility::Private {
            return Err(LobbyError::RoomNotPrivate);
        }
        if !room.invited_users.iter().any(|u| u == target) {
            return Err(LobbyError::NotInvited);
        }
        room.invited_users.retain(|u| u != target);
        room.players.push(target.to_string());
        if room.players.len() == 1 {
            room.host = target.to_string();
        }
        info!("User {} accepted invite to room {}", target, room_id);
        Ok(room.game)
    }

    /// Resolves an invitation by decline. The room is deleted if the
    /// decline leaves it with neither players nor pending invites.
    pub fn decline(&mut self, target: &str, room_id: &str) -> DeclineOutcome {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return DeclineOutcome {
                was_invited: false,
                room_deleted: false,
            };
        };
        let before = room.invited_users.len();
        room.invited_users.retain(|u| u != target);
        let was_invited = room.invited_users.len() < before;
        let room_deleted = room.is_empty();
        if room_deleted {
            self.delete(room_id);
        }
        DeclineOutcome {
            was_invited,
            room_deleted,
        }
    }

    /// Removes a player from whichever room they occupy, reassigning
    /// the host role and deleting the room as required. Used by
    /// explicit leave, logout, disconnect, and game-over cleanup.
    pub fn leave(&mut self, username: &str) -> Option<LeaveOutcome> {
        let room_id = self.room_of(username)?.room_id.clone();
        let room = self.rooms.get_mut(&room_id)?;
        room.players.retain(|p| p != username);

        let mut new_host = None;
        if room.host == username {
            if let Some(next) = room.players.first() {
                room.host = next.clone();
                new_host = Some(next.clone());
            }
        }
        let remaining = room.players.clone();
        let deleted = room.is_empty();
        if deleted {
            self.delete(&room_id);
        }
        Some(LeaveOutcome {
            room_id,
            new_host,
            remaining,
            deleted,
        })
    }

    /// Host-only transition into the in-game state once the room is
    /// full. The caller performs the handoff.
    pub fn start(&mut self, username: &str) -> Result<StartInfo, LobbyError> {
        let room_id = self
            .room_of(username)
            .map(|room| room.room_id.clone())
            .ok_or(LobbyError::NotInRoom)?;
        let room = self.rooms.get_mut(&room_id).ok_or(LobbyError::RoomNotFound)?;
        if room.host != username {
            return Err(LobbyError::NotHost);
        }
        if room.status == RoomStatus::InGame {
            return Err(LobbyError::RoomInGame);
        }
        if room.players.len() < ROOM_CAPACITY {
            return Err(LobbyError::RoomNotFull);
        }
        let guest = room
            .players
            .iter()
            .find(|p| *p != username)
            .cloned()
            .ok_or(LobbyError::RoomNotFull)?;
        room.status = RoomStatus::InGame;
        info!("Room {} started {}", room_id, room.game);
        Ok(StartInfo {
            room_id,
            game: room.game,
            host: username.to_string(),
            guest,
        })
    }

    /// Game-completion cleanup for one player: they leave the room,
    /// and a room that keeps its other player drops back to waiting.
    pub fn game_over(&mut self, username: &str) -> Option<LeaveOutcome> {
        let outcome = self.leave(username)?;
        if !outcome.deleted {
            if let Some(room) = self.rooms.get_mut(&outcome.room_id) {
                room.status = RoomStatus::Waiting;
            }
        }
        Some(outcome)
    }

    /// Drops every pending invitation naming a departed user. Their
    /// invites do not survive the session; rooms emptied by the purge
    /// are deleted. Returns the affected room ids.
    pub fn purge_invites(&mut self, username: &str) -> Vec<String> {
        let affected: Vec<String> = self
            .rooms
            .values()
            .filter(|room| room.invited_users.iter().any(|u| u == username))
            .map(|room| room.room_id.clone())
            .collect();
        for room_id in &affected {
            if let Some(room) = self.rooms.get_mut(room_id) {
                room.invited_users.retain(|u| u != username);
                if room.is_empty() {
                    self.delete(room_id);
                }
            }
        }
        affected
    }

    /// Tears a room down unconditionally (fatal handoff failure).
    pub fn remove_room(&mut self, room_id: &str) -> Option<Room> {
        let room = self.rooms.remove(room_id);
        if room.is_some() {
            info!("Room {} has been deleted", room_id);
        }
        room
    }

    fn delete(&mut self, room_id: &str) {
        if self.rooms.remove(room_id).is_some() {
            info!("Room {} has been deleted", room_id);
        }
    }

    /// Full room snapshot, sorted for stable output. Entries carry
    /// their visibility so consumers can filter private rooms.
    pub fn snapshot(&self) -> Vec<RoomEntry> {
        let mut entries: Vec<RoomEntry> = self.rooms.values().map(Room::entry).collect();
        entries.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        entries
    }

    /// Snapshot restricted to publicly listed rooms. Private rooms
    /// only ever reach their own members and invitees.
    pub fn public_snapshot(&self) -> Vec<RoomEntry> {
        let mut entries: Vec<RoomEntry> = self
            .rooms
            .values()
            .filter(|r| r.visibility == Visibility::Public)
            .map(Room::entry)
            .collect();
        entries.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        entries
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_room(visibility: Visibility) -> (RoomRegistry, String) {
        let mut registry = RoomRegistry::new();
        let room_id = registry
            .create("alice", visibility, GameId::RockPaperScissors)
            .unwrap()
            .room_id
            .clone();
        (registry, room_id)
    }

    #[test]
    fn test_create_sets_creator_as_host() {
        let (registry, room_id) = registry_with_room(Visibility::Public);
        let room = registry.get(&room_id).unwrap();
        assert_eq!(room.host, "alice");
        assert_eq!(room.creator, "alice");
        assert_eq!(room.players, vec!["alice"]);
        assert_eq!(room.status, RoomStatus::Waiting);
    }

    #[test]
    fn test_create_while_in_room_fails() {
        let (mut registry, _) = registry_with_room(Visibility::Public);
        let err = registry
            .create("alice", Visibility::Public, GameId::TicTacToe)
            .unwrap_err();
        assert_eq!(err, LobbyError::AlreadyInRoom);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_capacity_is_never_exceeded() {
        let (mut registry, room_id) = registry_with_room(Visibility::Public);
        registry.join(&room_id, "bob").unwrap();
        assert_eq!(registry.join(&room_id, "carol"), Err(LobbyError::RoomFull));
        assert_eq!(registry.get(&room_id).unwrap().players.len(), ROOM_CAPACITY);
    }

    #[test]
    fn test_join_unknown_room() {
        let mut registry = RoomRegistry::new();
        assert_eq!(
            registry.join("no-such-room", "bob"),
            Err(LobbyError::RoomNotFound)
        );
    }

    #[test]
    fn test_join_in_game_room_fails() {
        let (mut registry, room_id) = registry_with_room(Visibility::Public);
        registry.join(&room_id, "bob").unwrap();
        registry.start("alice").unwrap();
        assert_eq!(registry.join(&room_id, "carol"), Err(LobbyError::RoomInGame));
    }

    #[test]
    fn test_private_room_rejects_uninvited() {
        let (mut registry, room_id) = registry_with_room(Visibility::Private);
        assert_eq!(
            registry.join(&room_id, "bob"),
            Err(LobbyError::PrivateRoomForbidden)
        );
    }

    #[test]
    fn test_private_room_admits_invited_via_join() {
        let (mut registry, room_id) = registry_with_room(Visibility::Private);
        registry.invite("alice", "bob", &room_id).unwrap();
        registry.join(&room_id, "bob").unwrap();
        let room = registry.get(&room_id).unwrap();
        assert!(room.players.iter().any(|p| p == "bob"));
        assert!(room.invited_users.is_empty());
    }

    #[test]
    fn test_invite_checks() {
        let (mut registry, room_id) = registry_with_room(Visibility::Private);
        assert_eq!(
            registry.invite("bob", "carol", &room_id),
            Err(LobbyError::NotHost)
        );
        registry.invite("alice", "bob", &room_id).unwrap();
        assert_eq!(
            registry.invite("alice", "bob", &room_id),
            Err(LobbyError::AlreadyInvited("bob".to_string()))
        );
        assert_eq!(
            registry.invite("alice", "alice", &room_id),
            Err(LobbyError::AlreadyInRoom)
        );
    }

    #[test]
    fn test_invite_to_public_room_fails() {
        let (mut registry, room_id) = registry_with_room(Visibility::Public);
        assert_eq!(
            registry.invite("alice", "bob", &room_id),
            Err(LobbyError::RoomNotPrivate)
        );
    }

    #[test]
    fn test_accept_moves_target_into_players() {
        let (mut registry, room_id) = registry_with_room(Visibility::Private);
        registry.invite("alice", "bob", &room_id).unwrap();
        registry.accept("bob", &room_id).unwrap();
        let room = registry.get(&room_id).unwrap();
        assert!(room.players.iter().any(|p| p == "bob"));
        assert!(!room.invited_users.iter().any(|u| u == "bob"));
    }

    #[test]
    fn test_accept_without_invite_fails() {
        let (mut registry, room_id) = registry_with_room(Visibility::Private);
        assert_eq!(registry.accept("bob", &room_id), Err(LobbyError::NotInvited));
    }

    #[test]
    fn test_accept_into_abandoned_room_makes_acceptor_host() {
        let (mut registry, room_id) = registry_with_room(Visibility::Private);
        registry.invite("alice", "bob", &room_id).unwrap();
        // Host walks out while the invite is pending; the room survives
        // because an invite is outstanding.
        let outcome = registry.leave("alice").unwrap();
        assert!(!outcome.deleted);
        registry.accept("bob", &room_id).unwrap();
        assert_eq!(registry.get(&room_id).unwrap().host, "bob");
    }

    #[test]
    fn test_decline_removes_invite_and_notifies() {
        let (mut registry, room_id) = registry_with_room(Visibility::Private);
        registry.invite("alice", "bob", &room_id).unwrap();
        let outcome = registry.decline("bob", &room_id);
        assert!(outcome.was_invited);
        assert!(!outcome.room_deleted);
        assert!(registry.get(&room_id).unwrap().invited_users.is_empty());
    }

    #[test]
    fn test_decline_of_last_invite_deletes_empty_room() {
        let (mut registry, room_id) = registry_with_room(Visibility::Private);
        registry.invite("alice", "bob", &room_id).unwrap();
        registry.leave("alice").unwrap();
        let outcome = registry.decline("bob", &room_id);
        assert!(outcome.room_deleted);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_host_leave_reassigns_and_reports() {
        let (mut registry, room_id) = registry_with_room(Visibility::Public);
        registry.join(&room_id, "bob").unwrap();
        let outcome = registry.leave("alice").unwrap();
        assert_eq!(outcome.new_host, Some("bob".to_string()));
        assert_eq!(outcome.remaining, vec!["bob"]);
        assert!(!outcome.deleted);
        assert_eq!(registry.get(&room_id).unwrap().host, "bob");
    }

    #[test]
    fn test_guest_leave_keeps_host() {
        let (mut registry, room_id) = registry_with_room(Visibility::Public);
        registry.join(&room_id, "bob").unwrap();
        let outcome = registry.leave("bob").unwrap();
        assert_eq!(outcome.new_host, None);
        assert_eq!(registry.get(&room_id).unwrap().host, "alice");
    }

    #[test]
    fn test_last_leave_deletes_room() {
        let (mut registry, _room_id) = registry_with_room(Visibility::Public);
        let outcome = registry.leave("alice").unwrap();
        assert!(outcome.deleted);
        assert!(registry.is_empty());
        assert!(registry.leave("alice").is_none());
    }

    #[test]
    fn test_start_requires_host_and_full_room() {
        let (mut registry, room_id) = registry_with_room(Visibility::Public);
        assert_eq!(registry.start("alice"), Err(LobbyError::RoomNotFull));
        assert_eq!(
            registry.get(&room_id).unwrap().status,
            RoomStatus::Waiting
        );
        registry.join(&room_id, "bob").unwrap();
        assert_eq!(registry.start("bob"), Err(LobbyError::NotHost));
        let info = registry.start("alice").unwrap();
        assert_eq!(info.host, "alice");
        assert_eq!(info.guest, "bob");
        assert_eq!(registry.get(&room_id).unwrap().status, RoomStatus::InGame);
        assert_eq!(registry.start("alice"), Err(LobbyError::RoomInGame));
    }

    #[test]
    fn test_start_outside_any_room() {
        let mut registry = RoomRegistry::new();
        assert_eq!(registry.start("alice"), Err(LobbyError::NotInRoom));
    }

    #[test]
    fn test_game_over_returns_room_to_waiting() {
        let (mut registry, room_id) = registry_with_room(Visibility::Public);
        registry.join(&room_id, "bob").unwrap();
        registry.start("alice").unwrap();

        let outcome = registry.game_over("alice").unwrap();
        assert!(!outcome.deleted);
        assert_eq!(outcome.new_host, Some("bob".to_string()));
        assert_eq!(registry.get(&room_id).unwrap().status, RoomStatus::Waiting);

        let outcome = registry.game_over("bob").unwrap();
        assert!(outcome.deleted);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_purge_invites_drops_pending_invitations() {
        let (mut registry, room_id) = registry_with_room(Visibility::Private);
        registry.invite("alice", "bob", &room_id).unwrap();
        let affected = registry.purge_invites("bob");
        assert_eq!(affected, vec![room_id.clone()]);
        assert!(registry.get(&room_id).unwrap().invited_users.is_empty());
    }

    #[test]
    fn test_purge_invites_deletes_orphaned_room() {
        let (mut registry, _room_id) = registry_with_room(Visibility::Private);
        let room_id = registry.room_of("alice").unwrap().room_id.clone();
        registry.invite("alice", "bob", &room_id).unwrap();
        registry.leave("alice").unwrap();
        registry.purge_invites("bob");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_lists_all_rooms_with_visibility() {
        let mut registry = RoomRegistry::new();
        registry
            .create("alice", Visibility::Public, GameId::TicTacToe)
            .unwrap();
        registry
            .create("bob", Visibility::Private, GameId::ConnectFour)
            .unwrap();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().any(|r| r.visibility == Visibility::Private));
        assert!(snapshot.iter().any(|r| r.visibility == Visibility::Public));
    }

    #[test]
    fn test_public_snapshot_hides_private_rooms() {
        let mut registry = RoomRegistry::new();
        registry
            .create("alice", Visibility::Public, GameId::TicTacToe)
            .unwrap();
        registry
            .create("bob", Visibility::Private, GameId::ConnectFour)
            .unwrap();
        let snapshot = registry.public_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].host, "alice");
    }
}
