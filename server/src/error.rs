//! Lobby failure taxonomy.
//!
//! Every variant maps to an `error` frame sent to the requesting
//! client only; none of them abort the connection or leak to other
//! sessions. Transient write failures and fatal handoff failures are
//! handled at their call sites, not here.

use shared::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LobbyError {
    // Authentication
    #[error("Username already exists")]
    UsernameTaken,
    #[error("User does not exist")]
    UnknownUser,
    #[error("Incorrect password")]
    BadCredential,
    #[error("User already logged in")]
    AlreadyLoggedIn,
    #[error("Not logged in")]
    NotLoggedIn,

    // Room state
    #[error("Invalid room type")]
    InvalidVisibility,
    #[error("Game does not exist")]
    UnknownGame,
    #[error("You are already in a room")]
    AlreadyInRoom,
    #[error("Room does not exist")]
    RoomNotFound,
    #[error("Room is full")]
    RoomFull,
    #[error("Room is already in game")]
    RoomInGame,
    #[error("Cannot join a private room without invitation")]
    PrivateRoomForbidden,
    #[error("Only the room host can do that")]
    NotHost,
    #[error("Cannot start game: the room is not full")]
    RoomNotFull,
    #[error("Cannot invite players to a public room")]
    RoomNotPrivate,
    #[error("You are not in a room")]
    NotInRoom,

    // Invitations
    #[error("{0} has already been invited")]
    AlreadyInvited(String),
    #[error("Target user not online")]
    TargetNotOnline,
    #[error("Target user is not idle")]
    TargetBusy,
    #[error("You have not been invited to this room")]
    NotInvited,

    // Malformed input
    #[error("{0}")]
    BadRequest(ProtocolError),
}

impl From<ProtocolError> for LobbyError {
    fn from(err: ProtocolError) -> Self {
        LobbyError::BadRequest(err)
    }
}
