//! Wire protocol shared by the lobby server and client.
//!
//! Every frame on the wire is one JSON object followed by a newline.
//! Clients send [`Request`] frames; the server answers with
//! [`ServerEvent`] frames tagged by their `status` field. Unsolicited
//! pushes (invites, host transfers, snapshot updates, handoff
//! descriptors) share the same stream, so both sides must treat the
//! connection as an asynchronous message stream rather than strict
//! request/response.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raw request frame: a command name plus positional string parameters.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Request {
    pub command: String,
    #[serde(default)]
    pub params: Vec<String>,
}

impl Request {
    pub fn new(command: &str, params: Vec<String>) -> Self {
        Self {
            command: command.to_string(),
            params,
        }
    }
}

/// Malformed request frames. Reported to the sender only; never
/// touches lobby state.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Unknown command")]
    UnknownCommand(String),
    #[error("Invalid {0} command")]
    BadArity(&'static str),
}

/// The closed set of lobby commands.
///
/// Parsing validates arity up front so handlers only ever see
/// well-formed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Register { username: String, password: String },
    Login { username: String, password: String },
    Logout,
    CreateRoom { visibility: String, game: String },
    JoinRoom { room_id: String },
    InvitePlayer { target: String, room_id: String },
    AcceptInvite { room_id: String },
    DeclineInvite { host: String, room_id: String },
    LeaveRoom,
    StartGame,
    ShowStatus,
    GameOver,
}

impl Command {
    pub fn parse(request: &Request) -> Result<Self, ProtocolError> {
        let name = request.command.to_ascii_uppercase();
        let p = &request.params;
        match name.as_str() {
            "REGISTER" => match p.as_slice() {
                [username, password] => Ok(Command::Register {
                    username: username.clone(),
                    password: password.clone(),
                }),
                _ => Err(ProtocolError::BadArity("REGISTER")),
            },
            "LOGIN" => match p.as_slice() {
                [username, password] => Ok(Command::Login {
                    username: username.clone(),
                    password: password.clone(),
                }),
                _ => Err(ProtocolError::BadArity("LOGIN")),
            },
            "LOGOUT" => Ok(Command::Logout),
            "CREATE_ROOM" => match p.as_slice() {
                [visibility, game] => Ok(Command::CreateRoom {
                    visibility: visibility.clone(),
                    game: game.clone(),
                }),
                _ => Err(ProtocolError::BadArity("CREATE_ROOM")),
            },
            "JOIN_ROOM" => match p.as_slice() {
                [room_id] => Ok(Command::JoinRoom {
                    room_id: room_id.clone(),
                }),
                _ => Err(ProtocolError::BadArity("JOIN_ROOM")),
            },
            "INVITE_PLAYER" => match p.as_slice() {
                [target, room_id] => Ok(Command::InvitePlayer {
                    target: target.clone(),
                    room_id: room_id.clone(),
                }),
                _ => Err(ProtocolError::BadArity("INVITE_PLAYER")),
            },
            "ACCEPT_INVITE" => match p.as_slice() {
                [room_id] => Ok(Command::AcceptInvite {
                    room_id: room_id.clone(),
                }),
                _ => Err(ProtocolError::BadArity("ACCEPT_INVITE")),
            },
            "DECLINE_INVITE" => match p.as_slice() {
                [host, room_id] => Ok(Command::DeclineInvite {
                    host: host.clone(),
                    room_id: room_id.clone(),
                }),
                _ => Err(ProtocolError::BadArity("DECLINE_INVITE")),
            },
            "LEAVE_ROOM" => Ok(Command::LeaveRoom),
            "START_GAME" => Ok(Command::StartGame),
            "SHOW_STATUS" => Ok(Command::ShowStatus),
            "GAME_OVER" => Ok(Command::GameOver),
            _ => Err(ProtocolError::UnknownCommand(request.command.clone())),
        }
    }
}

/// Per-user lobby status, as seen in online-user snapshots.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Idle,
    InRoom,
    InGame,
}

/// Room lifecycle status.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    InGame,
}

/// Room visibility. Private rooms admit only invited users.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl FromStr for Visibility {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

/// The closed catalog of games the lobby can pair players for.
///
/// The lobby core only needs an identifier; move validation and win
/// detection live entirely in the peer-to-peer clients.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameId {
    RockPaperScissors,
    TicTacToe,
    ConnectFour,
}

impl GameId {
    pub const ALL: [GameId; 3] = [
        GameId::RockPaperScissors,
        GameId::TicTacToe,
        GameId::ConnectFour,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameId::RockPaperScissors => "rock_paper_scissors",
            GameId::TicTacToe => "tic_tac_toe",
            GameId::ConnectFour => "connect_four",
        }
    }
}

impl FromStr for GameId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rock_paper_scissors" => Ok(GameId::RockPaperScissors),
            "tic_tac_toe" => Ok(GameId::TicTacToe),
            "connect_four" => Ok(GameId::ConnectFour),
            _ => Err(()),
        }
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role handed to each participant at the peer-to-peer handoff. The
/// host listens on its own port; the client dials the host.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PeerRole {
    Host,
    Client,
}

/// One entry in the online-user snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserEntry {
    pub username: String,
    pub status: UserStatus,
}

/// One entry in the public-room snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RoomEntry {
    pub room_id: String,
    pub creator: String,
    pub host: String,
    pub game: GameId,
    pub status: RoomStatus,
    pub visibility: Visibility,
}

/// Full-state snapshot payloads pushed to every connected session.
/// Consumers replace their local view wholesale on receipt.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Snapshot {
    OnlineUsers(Vec<UserEntry>),
    PublicRooms(Vec<RoomEntry>),
}

/// One-shot lobby events carried inside `broadcast` frames.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LobbyEvent {
    UserLogin {
        username: String,
    },
    UserLogout {
        username: String,
    },
    RoomCreated {
        room_id: String,
        creator: String,
        game: GameId,
        visibility: Visibility,
    },
}

/// Every frame the server writes, tagged by its `status` field.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServerEvent {
    Success {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        game: Option<GameId>,
    },
    Error {
        message: String,
    },
    Update {
        #[serde(flatten)]
        snapshot: Snapshot,
    },
    Invite {
        from: String,
        room_id: String,
        game: GameId,
    },
    InviteDeclined {
        from: String,
        room_id: String,
    },
    P2pInfo {
        role: PeerRole,
        peer_addr: String,
        peer_port: u16,
        own_port: u16,
        game: GameId,
    },
    HostTransfer {
        room_id: String,
        new_host: String,
    },
    Broadcast {
        #[serde(flatten)]
        event: LobbyEvent,
    },
    Status {
        public_rooms: Vec<RoomEntry>,
        online_users: Vec<UserEntry>,
    },
    Info {
        message: String,
    },
}

impl ServerEvent {
    pub fn success(message: impl Into<String>) -> Self {
        ServerEvent::Success {
            message: message.into(),
            room_id: None,
            game: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        ServerEvent::Info {
            message: message.into(),
        }
    }
}

/// Encodes one message as a newline-terminated JSON frame.
pub fn encode_frame<T: Serialize>(message: &T) -> serde_json::Result<String> {
    let mut frame = serde_json::to_string(message)?;
    frame.push('\n');
    Ok(frame)
}

/// Decodes one newline-delimited frame. Trailing whitespace from the
/// line reader is tolerated.
pub fn decode_frame<T: for<'de> Deserialize<'de>>(line: &str) -> serde_json::Result<T> {
    serde_json::from_str(line.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse_roundtrip() {
        let request = Request::new("JOIN_ROOM", vec!["abc-123".to_string()]);
        let command = Command::parse(&request).unwrap();
        assert_eq!(
            command,
            Command::JoinRoom {
                room_id: "abc-123".to_string()
            }
        );
    }

    #[test]
    fn test_command_parse_case_insensitive() {
        let request = Request::new("logout", vec![]);
        assert_eq!(Command::parse(&request).unwrap(), Command::Logout);
    }

    #[test]
    fn test_command_parse_bad_arity() {
        let request = Request::new("LOGIN", vec!["alice".to_string()]);
        assert_eq!(
            Command::parse(&request),
            Err(ProtocolError::BadArity("LOGIN"))
        );
    }

    #[test]
    fn test_command_parse_unknown() {
        let request = Request::new("TELEPORT", vec![]);
        assert!(matches!(
            Command::parse(&request),
            Err(ProtocolError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_request_missing_params_defaults_empty() {
        let request: Request = decode_frame(r#"{"command":"LOGOUT"}"#).unwrap();
        assert!(request.params.is_empty());
        assert_eq!(Command::parse(&request).unwrap(), Command::Logout);
    }

    #[test]
    fn test_success_frame_shape() {
        let frame = encode_frame(&ServerEvent::success("LOGIN_SUCCESS alice")).unwrap();
        assert!(frame.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(frame.trim_end()).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["message"], "LOGIN_SUCCESS alice");
        // Optional fields stay off the wire when unset
        assert!(value.get("room_id").is_none());
    }

    #[test]
    fn test_update_frame_flattens_snapshot() {
        let event = ServerEvent::Update {
            snapshot: Snapshot::OnlineUsers(vec![UserEntry {
                username: "alice".to_string(),
                status: UserStatus::Idle,
            }]),
        };
        let value: serde_json::Value =
            serde_json::from_str(encode_frame(&event).unwrap().trim_end()).unwrap();
        assert_eq!(value["status"], "update");
        assert_eq!(value["type"], "online_users");
        assert_eq!(value["data"][0]["username"], "alice");
        assert_eq!(value["data"][0]["status"], "idle");
    }

    #[test]
    fn test_broadcast_frame_flattens_event() {
        let event = ServerEvent::Broadcast {
            event: LobbyEvent::UserLogin {
                username: "bob".to_string(),
            },
        };
        let value: serde_json::Value =
            serde_json::from_str(encode_frame(&event).unwrap().trim_end()).unwrap();
        assert_eq!(value["status"], "broadcast");
        assert_eq!(value["event"], "user_login");
        assert_eq!(value["username"], "bob");
    }

    #[test]
    fn test_p2p_info_roundtrip() {
        let event = ServerEvent::P2pInfo {
            role: PeerRole::Host,
            peer_addr: "10.0.0.7".to_string(),
            peer_port: 20451,
            own_port: 20377,
            game: GameId::TicTacToe,
        };
        let frame = encode_frame(&event).unwrap();
        let decoded: ServerEvent = decode_frame(&frame).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_status_frame_carries_both_snapshots() {
        let event = ServerEvent::Status {
            public_rooms: vec![],
            online_users: vec![UserEntry {
                username: "carol".to_string(),
                status: UserStatus::InGame,
            }],
        };
        let value: serde_json::Value =
            serde_json::from_str(encode_frame(&event).unwrap().trim_end()).unwrap();
        assert_eq!(value["status"], "status");
        assert_eq!(value["online_users"][0]["status"], "in_game");
        assert!(value["public_rooms"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_game_id_parse() {
        assert_eq!(
            "rock_paper_scissors".parse::<GameId>(),
            Ok(GameId::RockPaperScissors)
        );
        assert_eq!("tic_tac_toe".parse::<GameId>(), Ok(GameId::TicTacToe));
        assert!("chess".parse::<GameId>().is_err());
    }

    #[test]
    fn test_visibility_parse() {
        assert_eq!("public".parse::<Visibility>(), Ok(Visibility::Public));
        assert_eq!("private".parse::<Visibility>(), Ok(Visibility::Private));
        assert!("hidden".parse::<Visibility>().is_err());
    }

    #[test]
    fn test_decode_frame_rejects_garbage() {
        assert!(decode_frame::<Request>("not json\n").is_err());
    }
}
