//! # Lobby Client Library
//!
//! Terminal client for the lobby server. The library half carries the
//! reusable pieces: the server connection with its background reader
//! task, and the phase machine that folds server frames into a local
//! view of the session.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! TCP connection management: frame encoding on send, a spawned reader
//! that decodes incoming frames onto a channel.
//!
//! ### State Module (`state`)
//! The client's lobby phase machine (connected, authenticated, in a
//! room, in a game), pending invitations, and the handoff descriptor
//! received when a match starts.

pub mod network;
pub mod state;
