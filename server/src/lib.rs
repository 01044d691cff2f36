//! # Lobby Server Library
//!
//! This library implements the matchmaking server for the two-player
//! game lobby. It owns the account store, every live session, and the
//! room registry, and it brokers the peer-to-peer handoff that moves a
//! started match off the server entirely.
//!
//! ## Core Responsibilities
//!
//! ### Account Management
//! Registration and login against a salted, iterated HMAC-SHA256
//! credential store persisted as JSON. Credentials survive restarts;
//! sessions and rooms do not.
//!
//! ### Lobby State
//! The server is the single authority on who is online, which rooms
//! exist, and who occupies them. All mutations funnel through the
//! [`lobby::Lobby`] facade, which enforces a fixed lock order and
//! delivers every notification after locks are released.
//!
//! ### Peer-to-Peer Handoff
//! Once a full room starts, the server allocates a port per player,
//! sends each side a connection descriptor naming its role and its
//! peer, and steps out of the data path. Gameplay traffic never
//! touches the lobby.
//!
//! ## Module Organization
//!
//! ### Auth Module (`auth`)
//! Password hashing, verification, and the persistent account store.
//!
//! ### Sessions Module (`sessions`)
//! Live connection registry: one session per username, each holding
//! the outbound frame queue for its connection.
//!
//! ### Rooms Module (`rooms`)
//! Two-player room lifecycle: creation, joining, invitations, host
//! reassignment, and teardown.
//!
//! ### Handoff Module (`handoff`)
//! Port allocation and the host/client descriptor pair built when a
//! match starts.
//!
//! ### Lobby Module (`lobby`)
//! The coordination layer tying the registries together. Every
//! command handler lives here.
//!
//! ### Network Module (`network`)
//! TCP accept loop, per-connection reader and writer tasks, and frame
//! dispatch.

pub mod auth;
pub mod error;
pub mod handoff;
pub mod lobby;
pub mod network;
pub mod rooms;
pub mod sessions;
