//! Authenticated session tracking.
//!
//! The registry owns every live session and its per-user status. A
//! session holds an [`Outbound`] handle, the sending side of the
//! connection's writer channel, so state-mutating code queues frames
//! without ever touching a socket. The actual write happens in the
//! connection's writer task, which keeps one stalled peer from
//! blocking anyone else's state updates.

use crate::error::LobbyError;
use log::{debug, info, warn};
use shared::{encode_frame, ServerEvent, UserEntry, UserStatus};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Sending half of a connection's outbound frame queue.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbound {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues one event for delivery. A failure here means the peer's
    /// writer task is gone; it is logged and never propagated, so one
    /// dead connection cannot abort the operation that triggered the
    /// write.
    pub fn send(&self, event: &ServerEvent) {
        match encode_frame(event) {
            Ok(frame) => {
                if self.tx.send(frame).is_err() {
                    debug!("Dropping frame for closed connection");
                }
            }
            Err(e) => warn!("Failed to encode outbound frame: {}", e),
        }
    }
}

/// One authenticated connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub addr: SocketAddr,
    pub status: UserStatus,
    pub outbound: Outbound,
}

/// All live sessions, keyed by username. A username has at most one
/// live session at any time.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a username to a connection. Fails if the user already has
    /// a live session; the existing session is unaffected.
    pub fn login(
        &mut self,
        username: &str,
        addr: SocketAddr,
        outbound: Outbound,
    ) -> Result<(), LobbyError> {
        if self.sessions.contains_key(username) {
            warn!("Duplicate login attempt for {}", username);
            return Err(LobbyError::AlreadyLoggedIn);
        }
        info!("User {} logged in from {}", username, addr);
        self.sessions.insert(
            username.to_string(),
            Session {
                username: username.to_string(),
                addr,
                status: UserStatus::Idle,
                outbound,
            },
        );
        Ok(())
    }

    /// Removes a session, returning it if one existed.
    pub fn remove(&mut self, username: &str) -> Option<Session> {
        let session = self.sessions.remove(username);
        if session.is_some() {
            info!("User {} logged out", username);
        }
        session
    }

    pub fn get(&self, username: &str) -> Option<&Session> {
        self.sessions.get(username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.sessions.contains_key(username)
    }

    pub fn status_of(&self, username: &str) -> Option<UserStatus> {
        self.sessions.get(username).map(|s| s.status)
    }

    pub fn set_status(&mut self, username: &str, status: UserStatus) -> bool {
        match self.sessions.get_mut(username) {
            Some(session) => {
                session.status = status;
                true
            }
            None => false,
        }
    }

    pub fn outbound_of(&self, username: &str) -> Option<Outbound> {
        self.sessions.get(username).map(|s| s.outbound.clone())
    }

    /// Full online-user snapshot, sorted for stable output.
    pub fn snapshot(&self) -> Vec<UserEntry> {
        let mut entries: Vec<UserEntry> = self
            .sessions
            .values()
            .map(|s| UserEntry {
                username: s.username.clone(),
                status: s.status,
            })
            .collect();
        entries.sort_by(|a, b| a.username.cmp(&b.username));
        entries
    }

    /// Outbound handles of every live session, for broadcast delivery
    /// after the registry lock is released.
    pub fn recipients(&self) -> Vec<Outbound> {
        self.sessions.values().map(|s| s.outbound.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    #[test]
    fn test_login_creates_idle_session() {
        let mut registry = SessionRegistry::new();
        let (outbound, _rx) = Outbound::channel();
        registry.login("alice", test_addr(), outbound).unwrap();

        assert!(registry.contains("alice"));
        assert_eq!(registry.status_of("alice"), Some(UserStatus::Idle));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_second_login_fails_and_first_survives() {
        let mut registry = SessionRegistry::new();
        let (outbound1, mut rx1) = Outbound::channel();
        let (outbound2, _rx2) = Outbound::channel();
        registry.login("alice", test_addr(), outbound1).unwrap();

        let second = registry.login("alice", "127.0.0.1:5001".parse().unwrap(), outbound2);
        assert_eq!(second, Err(LobbyError::AlreadyLoggedIn));

        // The original session still receives frames
        registry
            .get("alice")
            .unwrap()
            .outbound
            .send(&ServerEvent::info("still here"));
        assert!(rx1.try_recv().is_ok());
    }

    #[test]
    fn test_remove_returns_session() {
        let mut registry = SessionRegistry::new();
        let (outbound, _rx) = Outbound::channel();
        registry.login("alice", test_addr(), outbound).unwrap();

        let session = registry.remove("alice").unwrap();
        assert_eq!(session.username, "alice");
        assert!(registry.is_empty());
        assert!(registry.remove("alice").is_none());
    }

    #[test]
    fn test_status_transitions() {
        let mut registry = SessionRegistry::new();
        let (outbound, _rx) = Outbound::channel();
        registry.login("alice", test_addr(), outbound).unwrap();

        assert!(registry.set_status("alice", UserStatus::InRoom));
        assert_eq!(registry.status_of("alice"), Some(UserStatus::InRoom));
        assert!(registry.set_status("alice", UserStatus::InGame));
        assert_eq!(registry.status_of("alice"), Some(UserStatus::InGame));
        assert!(!registry.set_status("ghost", UserStatus::Idle));
    }

    #[test]
    fn test_snapshot_is_sorted_and_complete() {
        let mut registry = SessionRegistry::new();
        for name in ["carol", "alice", "bob"] {
            let (outbound, _rx) = Outbound::channel();
            registry.login(name, test_addr(), outbound).unwrap();
        }
        registry.set_status("bob", UserStatus::InRoom);

        let snapshot = registry.snapshot();
        let names: Vec<&str> = snapshot.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
        assert_eq!(snapshot[1].status, UserStatus::InRoom);
    }

    #[test]
    fn test_send_to_closed_channel_does_not_panic() {
        let (outbound, rx) = Outbound::channel();
        drop(rx);
        outbound.send(&ServerEvent::info("going nowhere"));
    }
}
