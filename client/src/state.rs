//! Client-side lobby state machine.
//!
//! The client mirrors the server's view of its own session as a small
//! phase machine and folds every received event into it. Phases only
//! move on frames the server actually sent, so the client can never
//! believe it is in a room the server disagrees about.

use shared::{GameId, PeerRole, ServerEvent};

/// Where this client currently stands in the lobby protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No usable connection to the server.
    Disconnected,
    /// TCP connection is up, nobody is logged in.
    Connected,
    /// Logged in, not in any room.
    Authenticated,
    /// Member of a room that has not started.
    InRoom,
    /// Handoff received; the match is running peer-to-peer.
    InGame,
}

/// A pending invitation received from another player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInvite {
    pub from: String,
    pub room_id: String,
    pub game: GameId,
}

/// The peer-to-peer descriptor delivered at game start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub role: PeerRole,
    pub peer_addr: String,
    pub peer_port: u16,
    pub own_port: u16,
    pub game: GameId,
}

#[derive(Debug)]
pub struct ClientState {
    phase: Phase,
    username: Option<String>,
    room_id: Option<String>,
    invites: Vec<PendingInvite>,
    handoff: Option<Handoff>,
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Connected,
            username: None,
            room_id: None,
            invites: Vec::new(),
            handoff: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn invites(&self) -> &[PendingInvite] {
        &self.invites
    }

    pub fn handoff(&self) -> Option<&Handoff> {
        self.handoff.as_ref()
    }

    /// Folds one server frame into the state machine.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Success {
                message, room_id, ..
            } => self.apply_success(message, room_id.as_deref()),
            ServerEvent::Invite {
                from,
                room_id,
                game,
            } => {
                let invite = PendingInvite {
                    from: from.clone(),
                    room_id: room_id.clone(),
                    game: *game,
                };
                if !self.invites.contains(&invite) {
                    self.invites.push(invite);
                }
            }
            ServerEvent::P2pInfo {
                role,
                peer_addr,
                peer_port,
                own_port,
                game,
            } => {
                self.handoff = Some(Handoff {
                    role: *role,
                    peer_addr: peer_addr.clone(),
                    peer_port: *peer_port,
                    own_port: *own_port,
                    game: *game,
                });
                self.phase = Phase::InGame;
            }
            // The room was torn down under us; fall back to the lobby.
            ServerEvent::Error { message } if message.contains("room has been closed") => {
                self.leave_room_state();
            }
            _ => {}
        }
    }

    fn apply_success(&mut self, message: &str, room_id: Option<&str>) {
        let mut words = message.split_whitespace();
        match words.next() {
            Some("LOGIN_SUCCESS") => {
                self.username = words.next().map(str::to_string);
                self.phase = Phase::Authenticated;
            }
            Some("LOGOUT_SUCCESS") => {
                *self = Self::new();
            }
            Some("CREATE_ROOM_SUCCESS") | Some("JOIN_ROOM_SUCCESS") => {
                self.room_id = room_id
                    .map(str::to_string)
                    .or_else(|| words.next().map(str::to_string));
                self.phase = Phase::InRoom;
            }
            Some("LEAVE_ROOM_SUCCESS") => self.leave_room_state(),
            _ => {}
        }
    }

    /// Call after the peer-to-peer match ends, alongside GAME_OVER.
    pub fn game_finished(&mut self) {
        if self.phase == Phase::InGame {
            self.leave_room_state();
        }
    }

    /// Call when the server connection is gone; the session state it
    /// described is gone with it.
    pub fn connection_lost(&mut self) {
        *self = Self::new();
        self.phase = Phase::Disconnected;
    }

    /// Drops a pending invite once it is accepted or declined.
    pub fn take_invite(&mut self, room_id: &str) -> Option<PendingInvite> {
        let index = self.invites.iter().position(|i| i.room_id == room_id)?;
        Some(self.invites.remove(index))
    }

    fn leave_room_state(&mut self) {
        self.room_id = None;
        self.handoff = None;
        if self.username.is_some() {
            self.phase = Phase::Authenticated;
        } else {
            self.phase = Phase::Connected;
        }
    }
}
