//! TCP front end: accept loop, per-connection tasks, and command
//! dispatch.
//!
//! Each client gets two tasks: the connection task reading
//! newline-delimited frames, and a writer task draining the outbound
//! channel onto the socket. All state changes go through [`Lobby`];
//! this layer only decodes, routes, and guarantees that disconnect
//! cleanup runs on every exit path. One client's malformed input or
//! dropped socket never propagates beyond its own connection; only a
//! failure of the listening socket itself ends the server.

use crate::error::LobbyError;
use crate::lobby::Lobby;
use crate::sessions::Outbound;
use log::{debug, info, warn};
use shared::{decode_frame, Command, Request, ServerEvent};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub struct LobbyServer {
    listener: TcpListener,
    lobby: Arc<Lobby>,
}

impl LobbyServer {
    pub async fn bind(addr: &str, lobby: Arc<Lobby>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Lobby server listening on {}", listener.local_addr()?);
        Ok(Self { listener, lobby })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Listener errors are fatal; everything that happens
    /// on an accepted connection stays inside its own task.
    pub async fn run(self) -> io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let lobby = Arc::clone(&self.lobby);
            tokio::spawn(async move {
                handle_connection(lobby, stream, addr).await;
            });
        }
    }
}

/// Owns one client connection from accept to cleanup.
async fn handle_connection(lobby: Arc<Lobby>, stream: TcpStream, addr: SocketAddr) {
    info!("New connection from {}", addr);
    let (read_half, mut write_half) = stream.into_split();
    let (outbound, mut outbound_rx) = Outbound::channel();

    // Writer task: the only place this connection's socket is written.
    // A failed write ends delivery for this peer and nothing else.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = write_half.write_all(frame.as_bytes()).await {
                debug!("Write to {} failed: {}", addr, e);
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut lines = BufReader::new(read_half).lines();
    let mut username: Option<String> = None;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                handle_frame(&lobby, &line, &mut username, addr, &outbound).await;
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Read error from {}: {}", addr, e);
                break;
            }
        }
    }

    // Cleanup runs whatever ended the loop: EOF, read error, or a
    // frame that closed the session.
    if let Some(name) = username.take() {
        lobby.disconnect(&name).await;
    }
    drop(outbound);
    let _ = writer.await;
    info!("Connection from {} closed", addr);
}

/// Decodes one frame and routes it. Malformed input is answered with
/// an `error` frame and never touches lobby state.
async fn handle_frame(
    lobby: &Arc<Lobby>,
    line: &str,
    username: &mut Option<String>,
    addr: SocketAddr,
    outbound: &Outbound,
) {
    let request: Request = match decode_frame(line) {
        Ok(request) => request,
        Err(e) => {
            debug!("Malformed frame from {}: {}", addr, e);
            outbound.send(&ServerEvent::error("Invalid message format"));
            return;
        }
    };
    let command = match Command::parse(&request) {
        Ok(command) => command,
        Err(e) => {
            outbound.send(&ServerEvent::error(LobbyError::from(e).to_string()));
            return;
        }
    };
    if let Err(e) = dispatch(lobby, command, username, addr, outbound).await {
        outbound.send(&ServerEvent::error(e.to_string()));
    }
}

fn require_login(username: &Option<String>) -> Result<String, LobbyError> {
    username.clone().ok_or(LobbyError::NotLoggedIn)
}

async fn dispatch(
    lobby: &Arc<Lobby>,
    command: Command,
    username: &mut Option<String>,
    addr: SocketAddr,
    outbound: &Outbound,
) -> Result<(), LobbyError> {
    match command {
        Command::Register {
            username: name,
            password,
        } => lobby.register(&name, &password, outbound).await,
        Command::Login {
            username: name,
            password,
        } => {
            // One authenticated user per connection. Accepting a second
            // LOGIN here would orphan the first session: its cleanup
            // only runs for the name this connection currently holds.
            if username.is_some() {
                return Err(LobbyError::AlreadyLoggedIn);
            }
            lobby
                .login(&name, &password, addr, outbound.clone())
                .await?;
            *username = Some(name);
            Ok(())
        }
        Command::Logout => {
            let name = require_login(username)?;
            lobby.logout(&name, outbound).await?;
            *username = None;
            Ok(())
        }
        Command::CreateRoom { visibility, game } => {
            let name = require_login(username)?;
            lobby.create_room(&name, &visibility, &game, outbound).await
        }
        Command::JoinRoom { room_id } => {
            let name = require_login(username)?;
            lobby.join_room(&name, &room_id, outbound).await
        }
        Command::InvitePlayer { target, room_id } => {
            let name = require_login(username)?;
            lobby
                .invite_player(&name, &target, &room_id, outbound)
                .await
        }
        Command::AcceptInvite { room_id } => {
            let name = require_login(username)?;
            lobby.accept_invite(&name, &room_id, outbound).await
        }
        Command::DeclineInvite { host, room_id } => {
            let name = require_login(username)?;
            lobby
                .decline_invite(&name, &host, &room_id, outbound)
                .await
        }
        Command::LeaveRoom => {
            let name = require_login(username)?;
            lobby.leave_room(&name, outbound).await
        }
        Command::StartGame => {
            let name = require_login(username)?;
            lobby.start_game(&name, outbound).await
        }
        Command::ShowStatus => {
            require_login(username)?;
            lobby.show_status(outbound).await;
            Ok(())
        }
        Command::GameOver => {
            let name = require_login(username)?;
            lobby.game_over(&name).await
        }
    }
}
