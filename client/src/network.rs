//! Server connection: framing, sending, and the background reader.
//!
//! A [`Connection`] owns the write half of the socket. The read half
//! lives in a spawned task that decodes newline-delimited frames and
//! forwards them over a channel, so the caller can `select!` between
//! server events and local input.

use log::{debug, warn};
use shared::{decode_frame, encode_frame, Request, ServerEvent};
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

pub struct Connection {
    write_half: OwnedWriteHalf,
}

impl Connection {
    /// Connects to the lobby server and spawns the reader task. The
    /// returned receiver yields decoded frames and closes when the
    /// server goes away.
    pub async fn connect(
        addr: &str,
    ) -> io::Result<(Self, mpsc::UnboundedReceiver<ServerEvent>)> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match decode_frame::<ServerEvent>(&line) {
                            Ok(event) => {
                                if tx.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Undecodable frame from server: {}", e),
                        }
                    }
                    Ok(None) => {
                        debug!("Server closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!("Read error from server: {}", e);
                        break;
                    }
                }
            }
        });

        Ok((Self { write_half }, rx))
    }

    pub async fn send(&mut self, request: &Request) -> io::Result<()> {
        let frame = encode_frame(request)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.write_half.write_all(frame.as_bytes()).await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.write_half.shutdown().await
    }
}
