//! The lobby: every operation of the matchmaking protocol.
//!
//! `Lobby` is the only owner of session and room state. Two
//! independent locks guard the two registries; whenever both are
//! needed the session lock is taken before the room lock, uniformly.
//! Critical sections do synchronous in-memory work only: frames are
//! collected while the locks are held and queued onto per-connection
//! writer channels after they are released, so a slow peer never
//! blocks anyone's state updates. Broadcasts are full snapshots taken
//! under the lock and delivered best-effort per recipient.

use crate::auth::AccountStore;
use crate::error::LobbyError;
use crate::handoff::{descriptor_pair, PortAllocator};
use crate::rooms::{LeaveOutcome, RoomRegistry};
use crate::sessions::{Outbound, SessionRegistry};
use log::{error, info, warn};
use shared::{
    GameId, LobbyEvent, ServerEvent, Snapshot, UserStatus, Visibility,
};
use std::net::SocketAddr;
use tokio::sync::{Mutex, RwLock};

/// Frames collected under the registry locks and sent afterwards.
#[derive(Default)]
struct Deliveries {
    direct: Vec<(Outbound, ServerEvent)>,
    broadcast: Vec<(Vec<Outbound>, ServerEvent)>,
}

impl Deliveries {
    fn to(&mut self, outbound: Outbound, event: ServerEvent) {
        self.direct.push((outbound, event));
    }

    fn all(&mut self, recipients: Vec<Outbound>, event: ServerEvent) {
        self.broadcast.push((recipients, event));
    }

    /// Best-effort delivery: a dead recipient is skipped, never fatal.
    fn flush(self) {
        for (outbound, event) in self.direct {
            outbound.send(&event);
        }
        for (recipients, event) in self.broadcast {
            for recipient in recipients {
                recipient.send(&event);
            }
        }
    }
}

pub struct Lobby {
    accounts: RwLock<AccountStore>,
    sessions: RwLock<SessionRegistry>,
    rooms: RwLock<RoomRegistry>,
    ports: PortAllocator,
    /// Held across snapshot-and-write so concurrent registrations
    /// reach the disk in mutation order; the account lock itself is
    /// never held over file I/O.
    persist: Mutex<()>,
}

impl Lobby {
    pub fn new(accounts: AccountStore, ports: PortAllocator) -> Self {
        Self {
            accounts: RwLock::new(accounts),
            sessions: RwLock::new(SessionRegistry::new()),
            rooms: RwLock::new(RoomRegistry::new()),
            ports,
            persist: Mutex::new(()),
        }
    }

    /// Creates an account and rewrites the persisted snapshot.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        reply: &Outbound,
    ) -> Result<(), LobbyError> {
        let _persisting = self.persist.lock().await;
        let (snapshot, path) = {
            let mut accounts = self.accounts.write().await;
            accounts.register(username, password)?;
            (accounts.to_json(), accounts.path().to_path_buf())
        };
        match snapshot {
            Ok(json) if !path.as_os_str().is_empty() => {
                if let Err(e) = tokio::fs::write(&path, json).await {
                    error!("Failed to persist accounts to {}: {}", path.display(), e);
                }
            }
            Ok(_) => {}
            Err(e) => error!("Failed to serialize account snapshot: {}", e),
        }
        info!("User registered: {}", username);
        reply.send(&ServerEvent::success("REGISTER_SUCCESS"));
        Ok(())
    }

    /// Authenticates a connection and announces the new session.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        addr: SocketAddr,
        outbound: Outbound,
    ) -> Result<(), LobbyError> {
        {
            let accounts = self.accounts.read().await;
            accounts.verify_login(username, password)?;
        }

        let mut deliveries = Deliveries::default();
        {
            let mut sessions = self.sessions.write().await;
            sessions.login(username, addr, outbound.clone())?;

            let rooms = self.rooms.read().await;
            deliveries.to(
                outbound.clone(),
                ServerEvent::success(format!("LOGIN_SUCCESS {}", username)),
            );
            deliveries.to(
                outbound,
                ServerEvent::Status {
                    public_rooms: rooms.public_snapshot(),
                    online_users: sessions.snapshot(),
                },
            );
            let recipients = sessions.recipients();
            deliveries.all(
                recipients.clone(),
                ServerEvent::Update {
                    snapshot: Snapshot::OnlineUsers(sessions.snapshot()),
                },
            );
            deliveries.all(
                recipients,
                ServerEvent::Broadcast {
                    event: LobbyEvent::UserLogin {
                        username: username.to_string(),
                    },
                },
            );
        }
        deliveries.flush();
        Ok(())
    }

    /// Explicit logout: confirms to the caller, then runs the shared
    /// departure cleanup.
    pub async fn logout(&self, username: &str, reply: &Outbound) -> Result<(), LobbyError> {
        self.depart(username).await?;
        reply.send(&ServerEvent::success("LOGOUT_SUCCESS"));
        Ok(())
    }

    /// Connection-loss cleanup. Runs unconditionally when a client
    /// task ends, whatever the cause; nothing is sent to the departed
    /// peer.
    pub async fn disconnect(&self, username: &str) {
        if self.depart(username).await.is_err() {
            // Already logged out through the normal path.
            return;
        }
        info!("User disconnected: {}", username);
    }

    /// Shared teardown for logout and disconnect: session removal,
    /// invite purge, room leave with host reassignment, and snapshot
    /// re-broadcast.
    async fn depart(&self, username: &str) -> Result<(), LobbyError> {
        let mut deliveries = Deliveries::default();
        {
            let mut sessions = self.sessions.write().await;
            if sessions.remove(username).is_none() {
                return Err(LobbyError::NotLoggedIn);
            }
            let mut rooms = self.rooms.write().await;
            rooms.purge_invites(username);
            let outcome = rooms.leave(username);
            if let Some(outcome) = &outcome {
                self.queue_leave_notices(&sessions, username, outcome, &mut deliveries);
            }

            let recipients = sessions.recipients();
            deliveries.all(
                recipients.clone(),
                ServerEvent::Broadcast {
                    event: LobbyEvent::UserLogout {
                        username: username.to_string(),
                    },
                },
            );
            deliveries.all(
                recipients.clone(),
                ServerEvent::Update {
                    snapshot: Snapshot::OnlineUsers(sessions.snapshot()),
                },
            );
            deliveries.all(
                recipients,
                ServerEvent::Update {
                    snapshot: Snapshot::PublicRooms(rooms.public_snapshot()),
                },
            );
        }
        deliveries.flush();
        Ok(())
    }

    /// Queues the host-transfer notice and member notifications that
    /// follow a player leaving a surviving room.
    fn queue_leave_notices(
        &self,
        sessions: &SessionRegistry,
        leaver: &str,
        outcome: &LeaveOutcome,
        deliveries: &mut Deliveries,
    ) {
        if let Some(new_host) = &outcome.new_host {
            if let Some(outbound) = sessions.outbound_of(new_host) {
                deliveries.to(
                    outbound,
                    ServerEvent::HostTransfer {
                        room_id: outcome.room_id.clone(),
                        new_host: new_host.clone(),
                    },
                );
            }
            for member in &outcome.remaining {
                if member == new_host {
                    continue;
                }
                if let Some(outbound) = sessions.outbound_of(member) {
                    deliveries.to(
                        outbound,
                        ServerEvent::info(format!(
                            "Host has left the room. New host is {}",
                            new_host
                        )),
                    );
                }
            }
        } else {
            for member in &outcome.remaining {
                if let Some(outbound) = sessions.outbound_of(member) {
                    deliveries.to(
                        outbound,
                        ServerEvent::info(format!("Player {} has left the room", leaver)),
                    );
                }
            }
        }
    }

    pub async fn create_room(
        &self,
        username: &str,
        visibility: &str,
        game: &str,
        reply: &Outbound,
    ) -> Result<(), LobbyError> {
        let visibility: Visibility = visibility
            .parse()
            .map_err(|_| LobbyError::InvalidVisibility)?;
        let game: GameId = game.parse().map_err(|_| LobbyError::UnknownGame)?;

        let mut deliveries = Deliveries::default();
        {
            let mut sessions = self.sessions.write().await;
            if !sessions.contains(username) {
                return Err(LobbyError::NotLoggedIn);
            }
            let mut rooms = self.rooms.write().await;
            let room_id = rooms.create(username, visibility, game)?.room_id.clone();
            sessions.set_status(username, UserStatus::InRoom);

            deliveries.to(
                reply.clone(),
                ServerEvent::Success {
                    message: format!("CREATE_ROOM_SUCCESS {} {}", room_id, game),
                    room_id: Some(room_id.clone()),
                    game: Some(game),
                },
            );
            let recipients = sessions.recipients();
            deliveries.all(
                recipients.clone(),
                ServerEvent::Update {
                    snapshot: Snapshot::PublicRooms(rooms.public_snapshot()),
                },
            );
            deliveries.all(
                recipients.clone(),
                ServerEvent::Update {
                    snapshot: Snapshot::OnlineUsers(sessions.snapshot()),
                },
            );
            deliveries.all(
                recipients,
                ServerEvent::Broadcast {
                    event: LobbyEvent::RoomCreated {
                        room_id,
                        creator: username.to_string(),
                        game,
                        visibility,
                    },
                },
            );
        }
        deliveries.flush();
        Ok(())
    }

    pub async fn join_room(
        &self,
        username: &str,
        room_id: &str,
        reply: &Outbound,
    ) -> Result<(), LobbyError> {
        let mut deliveries = Deliveries::default();
        {
            let mut sessions = self.sessions.write().await;
            if !sessions.contains(username) {
                return Err(LobbyError::NotLoggedIn);
            }
            let mut rooms = self.rooms.write().await;
            let game = rooms.join(room_id, username)?;
            sessions.set_status(username, UserStatus::InRoom);
            self.queue_join_frames(&sessions, &rooms, room_id, game, reply, &mut deliveries);
        }
        deliveries.flush();
        Ok(())
    }

    /// Success frame plus the snapshot updates shared by join and
    /// accept (both admit a player the same way downstream).
    fn queue_join_frames(
        &self,
        sessions: &SessionRegistry,
        rooms: &RoomRegistry,
        room_id: &str,
        game: GameId,
        reply: &Outbound,
        deliveries: &mut Deliveries,
    ) {
        deliveries.to(
            reply.clone(),
            ServerEvent::Success {
                message: format!("JOIN_ROOM_SUCCESS {} {}", room_id, game),
                room_id: Some(room_id.to_string()),
                game: Some(game),
            },
        );
        let recipients = sessions.recipients();
        deliveries.all(
            recipients.clone(),
            ServerEvent::Update {
                snapshot: Snapshot::PublicRooms(rooms.public_snapshot()),
            },
        );
        deliveries.all(
            recipients,
            ServerEvent::Update {
                snapshot: Snapshot::OnlineUsers(sessions.snapshot()),
            },
        );
    }

    /// Explicit leave. Always resets the caller to idle and re-sends
    /// both snapshots, whether or not they occupied a room.
    pub async fn leave_room(&self, username: &str, reply: &Outbound) -> Result<(), LobbyError> {
        let mut deliveries = Deliveries::default();
        {
            let mut sessions = self.sessions.write().await;
            if !sessions.contains(username) {
                return Err(LobbyError::NotLoggedIn);
            }
            let mut rooms = self.rooms.write().await;
            let outcome = rooms.leave(username);
            sessions.set_status(username, UserStatus::Idle);
            if let Some(outcome) = &outcome {
                self.queue_leave_notices(&sessions, username, outcome, &mut deliveries);
            }

            deliveries.to(reply.clone(), ServerEvent::success("LEAVE_ROOM_SUCCESS"));
            let recipients = sessions.recipients();
            deliveries.all(
                recipients.clone(),
                ServerEvent::Update {
                    snapshot: Snapshot::OnlineUsers(sessions.snapshot()),
                },
            );
            deliveries.all(
                recipients,
                ServerEvent::Update {
                    snapshot: Snapshot::PublicRooms(rooms.public_snapshot()),
                },
            );
        }
        deliveries.flush();
        Ok(())
    }

    /// Invitation push: the one place the server writes to a session
    /// outside a direct request/response exchange.
    pub async fn invite_player(
        &self,
        host: &str,
        target: &str,
        room_id: &str,
        reply: &Outbound,
    ) -> Result<(), LobbyError> {
        let mut deliveries = Deliveries::default();
        {
            let sessions = self.sessions.read().await;
            let target_session = sessions.get(target).ok_or(LobbyError::TargetNotOnline)?;
            if target_session.status != UserStatus::Idle {
                return Err(LobbyError::TargetBusy);
            }
            let target_outbound = target_session.outbound.clone();

            let mut rooms = self.rooms.write().await;
            let game = rooms.invite(host, target, room_id)?;

            deliveries.to(
                target_outbound,
                ServerEvent::Invite {
                    from: host.to_string(),
                    room_id: room_id.to_string(),
                    game,
                },
            );
            deliveries.to(
                reply.clone(),
                ServerEvent::success(format!("INVITE_SENT {} {}", target, room_id)),
            );
        }
        deliveries.flush();
        Ok(())
    }

    pub async fn accept_invite(
        &self,
        username: &str,
        room_id: &str,
        reply: &Outbound,
    ) -> Result<(), LobbyError> {
        let mut deliveries = Deliveries::default();
        {
            let mut sessions = self.sessions.write().await;
            if !sessions.contains(username) {
                return Err(LobbyError::NotLoggedIn);
            }
            let mut rooms = self.rooms.write().await;
            let game = rooms.accept(username, room_id)?;
            sessions.set_status(username, UserStatus::InRoom);
            self.queue_join_frames(&sessions, &rooms, room_id, game, reply, &mut deliveries);
        }
        deliveries.flush();
        Ok(())
    }

    /// Decline: the invite is dropped and the inviting host notified
    /// synchronously.
    pub async fn decline_invite(
        &self,
        username: &str,
        host: &str,
        room_id: &str,
        reply: &Outbound,
    ) -> Result<(), LobbyError> {
        let mut deliveries = Deliveries::default();
        {
            let sessions = self.sessions.read().await;
            let mut rooms = self.rooms.write().await;
            let outcome = rooms.decline(username, room_id);

            if let Some(outbound) = sessions.outbound_of(host) {
                deliveries.to(
                    outbound,
                    ServerEvent::InviteDeclined {
                        from: username.to_string(),
                        room_id: room_id.to_string(),
                    },
                );
            }
            deliveries.to(
                reply.clone(),
                ServerEvent::success(format!("DECLINE_INVITE_SUCCESS {}", room_id)),
            );
            if outcome.room_deleted {
                deliveries.all(
                    sessions.recipients(),
                    ServerEvent::Update {
                        snapshot: Snapshot::PublicRooms(rooms.public_snapshot()),
                    },
                );
            }
        }
        deliveries.flush();
        Ok(())
    }

    /// Host-only game start: flips the room in-game, allocates one
    /// port per participant and hands each a directed descriptor.
    /// After delivery the lobby is no longer on the match's data path.
    ///
    /// If the other participant's session vanished between room fill
    /// and handoff, the handoff is fatal for the room: it is torn down
    /// and the caller is put back to idle and told, rather than left
    /// waiting on a peer that will never dial in.
    pub async fn start_game(&self, username: &str, reply: &Outbound) -> Result<(), LobbyError> {
        let mut deliveries = Deliveries::default();
        {
            let mut sessions = self.sessions.write().await;
            let host_addr = sessions
                .get(username)
                .map(|s| s.addr)
                .ok_or(LobbyError::NotLoggedIn)?;
            let mut rooms = self.rooms.write().await;
            let info = rooms.start(username)?;

            let guest_session = sessions.get(&info.guest).cloned();
            match guest_session {
                Some(guest) => {
                    sessions.set_status(username, UserStatus::InGame);
                    sessions.set_status(&info.guest, UserStatus::InGame);

                    let (host_port, guest_port) = self.ports.allocate_pair();
                    let (for_host, for_guest) = descriptor_pair(
                        info.game,
                        host_addr.ip(),
                        guest.addr.ip(),
                        host_port,
                        guest_port,
                    );
                    info!(
                        "Handoff for room {}: {} hosts on {}, {} dials {}:{}",
                        info.room_id,
                        username,
                        host_port,
                        info.guest,
                        host_addr.ip(),
                        host_port
                    );
                    deliveries.to(reply.clone(), for_host);
                    deliveries.to(guest.outbound, for_guest);

                    let recipients = sessions.recipients();
                    deliveries.all(
                        recipients.clone(),
                        ServerEvent::Update {
                            snapshot: Snapshot::OnlineUsers(sessions.snapshot()),
                        },
                    );
                    deliveries.all(
                        recipients,
                        ServerEvent::Update {
                            snapshot: Snapshot::PublicRooms(rooms.public_snapshot()),
                        },
                    );
                }
                None => {
                    // Fatal handoff failure: stale peer endpoint.
                    error!(
                        "Handoff for room {} failed: {} has no live session",
                        info.room_id, info.guest
                    );
                    rooms.remove_room(&info.room_id);
                    sessions.set_status(username, UserStatus::Idle);

                    deliveries.to(
                        reply.clone(),
                        ServerEvent::error(
                            "Opponent is no longer connected; the room has been closed",
                        ),
                    );
                    let recipients = sessions.recipients();
                    deliveries.all(
                        recipients.clone(),
                        ServerEvent::Update {
                            snapshot: Snapshot::OnlineUsers(sessions.snapshot()),
                        },
                    );
                    deliveries.all(
                        recipients,
                        ServerEvent::Update {
                            snapshot: Snapshot::PublicRooms(rooms.public_snapshot()),
                        },
                    );
                }
            }
        }
        deliveries.flush();
        Ok(())
    }

    /// Full lobby snapshot for the requesting session only.
    pub async fn show_status(&self, reply: &Outbound) {
        let event = {
            let sessions = self.sessions.read().await;
            let rooms = self.rooms.read().await;
            ServerEvent::Status {
                public_rooms: rooms.public_snapshot(),
                online_users: sessions.snapshot(),
            }
        };
        reply.send(&event);
    }

    /// Game-completion notice from one participant: they return to
    /// idle and leave the room; a surviving room drops back to
    /// waiting.
    pub async fn game_over(&self, username: &str) -> Result<(), LobbyError> {
        let mut deliveries = Deliveries::default();
        {
            let mut sessions = self.sessions.write().await;
            if !sessions.set_status(username, UserStatus::Idle) {
                return Err(LobbyError::NotLoggedIn);
            }
            let mut rooms = self.rooms.write().await;
            if let Some(outcome) = rooms.game_over(username) {
                self.queue_leave_notices(&sessions, username, &outcome, &mut deliveries);
            } else {
                warn!("GAME_OVER from {} who is in no room", username);
            }

            let recipients = sessions.recipients();
            deliveries.all(
                recipients.clone(),
                ServerEvent::Update {
                    snapshot: Snapshot::OnlineUsers(sessions.snapshot()),
                },
            );
            deliveries.all(
                recipients,
                ServerEvent::Update {
                    snapshot: Snapshot::PublicRooms(rooms.public_snapshot()),
                },
            );
        }
        deliveries.flush();
        info!("User {} has ended the game and is now idle", username);
        Ok(())
    }
}
