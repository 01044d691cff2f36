use clap::Parser;
use client::network::Connection;
use client::state::{ClientState, Phase};
use log::debug;
use shared::{GameId, Request, ServerEvent, Snapshot};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Main-method of the application.
/// Parses command-line arguments, connects to the lobby server, then
/// runs a line-oriented prompt against it until EOF or `quit`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Lobby server IP address
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Lobby server port
        #[clap(short, long, default_value = "15000")]
        port: u16,
    }

    env_logger::init();
    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    let (mut connection, mut events) = Connection::connect(&address).await?;
    println!("Connected to lobby at {}", address);
    println!("Type 'help' for the command list.");

    let mut state = ClientState::new();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("quit") {
                    break;
                }
                if line.eq_ignore_ascii_case("help") {
                    print_help();
                    continue;
                }
                match build_request(line, &mut state) {
                    Ok(request) => {
                        if request.command == "GAME_OVER" {
                            state.game_finished();
                        }
                        connection.send(&request).await?;
                    }
                    Err(message) => println!("{}", message),
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    state.connection_lost();
                    println!("Server closed the connection");
                    break;
                };
                state.apply(&event);
                print_event(&event);
            }
        }
    }

    connection.shutdown().await?;
    debug!("Client exiting in phase {:?}", state.phase());
    Ok(())
}

/// Translates one prompt line into a protocol request. Commands that
/// reference an invitation consume it from the local state so the
/// decline can name the inviting host.
fn build_request(line: &str, state: &mut ClientState) -> Result<Request, String> {
    let mut words = line.split_whitespace();
    let keyword = words.next().unwrap_or_default().to_ascii_lowercase();
    let rest: Vec<String> = words.map(str::to_string).collect();

    let arity = |expected: usize, usage: &str| {
        if rest.len() == expected {
            Ok(())
        } else {
            Err(format!("Usage: {}", usage))
        }
    };

    match keyword.as_str() {
        "register" => {
            arity(2, "register <username> <password>")?;
            Ok(Request::new("REGISTER", rest))
        }
        "login" => {
            arity(2, "login <username> <password>")?;
            Ok(Request::new("LOGIN", rest))
        }
        "logout" => {
            arity(0, "logout")?;
            Ok(Request::new("LOGOUT", rest))
        }
        "create" => {
            arity(2, "create <public|private> <game>")?;
            Ok(Request::new("CREATE_ROOM", rest))
        }
        "join" => {
            arity(1, "join <room_id>")?;
            Ok(Request::new("JOIN_ROOM", rest))
        }
        "invite" => {
            arity(2, "invite <username> <room_id>")?;
            Ok(Request::new("INVITE_PLAYER", rest))
        }
        "accept" => {
            arity(1, "accept <room_id>")?;
            state.take_invite(&rest[0]);
            Ok(Request::new("ACCEPT_INVITE", rest))
        }
        "decline" => {
            arity(1, "decline <room_id>")?;
            let invite = state
                .take_invite(&rest[0])
                .ok_or_else(|| format!("No pending invite for room {}", rest[0]))?;
            Ok(Request::new(
                "DECLINE_INVITE",
                vec![invite.from, invite.room_id],
            ))
        }
        "leave" => {
            arity(0, "leave")?;
            Ok(Request::new("LEAVE_ROOM", rest))
        }
        "start" => {
            arity(0, "start")?;
            Ok(Request::new("START_GAME", rest))
        }
        "status" => {
            arity(0, "status")?;
            Ok(Request::new("SHOW_STATUS", rest))
        }
        "done" => {
            arity(0, "done")?;
            if state.phase() != Phase::InGame {
                return Err("Not in a game".to_string());
            }
            Ok(Request::new("GAME_OVER", rest))
        }
        other => Err(format!("Unknown command '{}'; type 'help'", other)),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  register <username> <password>   create an account");
    println!("  login <username> <password>      log in");
    println!("  logout                           log out");
    println!("  create <public|private> <game>   create a room");
    println!("  join <room_id>                   join a public room");
    println!("  invite <username> <room_id>      invite to a private room");
    println!("  accept <room_id>                 accept an invitation");
    println!("  decline <room_id>                decline an invitation");
    println!("  leave                            leave the current room");
    println!("  start                            start the game (host only)");
    println!("  status                           show rooms and players");
    println!("  done                             report the game finished");
    println!("  quit                             disconnect and exit");
    println!(
        "Games: {}",
        join_names(GameId::ALL.iter().map(GameId::as_str))
    );
}

fn print_event(event: &ServerEvent) {
    match event {
        ServerEvent::Success { message, .. } => println!("OK: {}", message),
        ServerEvent::Error { message } => println!("Error: {}", message),
        ServerEvent::Info { message } => println!("{}", message),
        ServerEvent::Update { snapshot } => print_snapshot(snapshot),
        ServerEvent::Invite {
            from,
            room_id,
            game,
        } => println!(
            "{} invited you to play {} in room {} (accept {} / decline {})",
            from, game, room_id, room_id, room_id
        ),
        ServerEvent::InviteDeclined { from, room_id } => {
            println!("{} declined your invitation to room {}", from, room_id)
        }
        ServerEvent::P2pInfo {
            role,
            peer_addr,
            peer_port,
            own_port,
            game,
        } => {
            println!("Game starting: {}", game);
            println!(
                "  role {:?}, peer {}:{}, your port {}",
                role, peer_addr, peer_port, own_port
            );
        }
        ServerEvent::HostTransfer { room_id, new_host } => {
            println!("{} is now the host of room {}", new_host, room_id)
        }
        ServerEvent::Broadcast { event } => println!("* {:?}", event),
        ServerEvent::Status {
            public_rooms,
            online_users,
        } => {
            println!("Online users:");
            for user in online_users {
                println!("  {} ({:?})", user.username, user.status);
            }
            println!("Public rooms:");
            for room in public_rooms {
                println!(
                    "  {} {} host={} ({:?})",
                    room.room_id, room.game, room.host, room.status
                );
            }
        }
    }
}

fn print_snapshot(snapshot: &Snapshot) {
    match snapshot {
        Snapshot::OnlineUsers(users) => {
            println!("Online now: {}", join_names(users.iter().map(|u| u.username.as_str())));
        }
        Snapshot::PublicRooms(rooms) => {
            println!(
                "Public rooms: {}",
                join_names(rooms.iter().map(|r| r.room_id.as_str()))
            );
        }
    }
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let joined: Vec<&str> = names.collect();
    if joined.is_empty() {
        "(none)".to_string()
    } else {
        joined.join(", ")
    }
}
