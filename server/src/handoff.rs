//! Peer-to-peer handoff: port allocation and descriptor pairing.
//!
//! When a full room starts, the lobby steps out of the data path. The
//! room host becomes the P2P host and listens on its allocated port;
//! the other player dials the host directly. Each side receives a
//! descriptor naming its role, the peer's address and port, and its
//! own listening port.

use rand::Rng;
use shared::{GameId, PeerRole, ServerEvent};
use std::net::IpAddr;

/// Allocates listening ports from a configured inclusive range.
#[derive(Debug, Clone, Copy)]
pub struct PortAllocator {
    lo: u16,
    hi: u16,
}

impl PortAllocator {
    pub fn new(lo: u16, hi: u16) -> Self {
        if lo <= hi {
            Self { lo, hi }
        } else {
            Self { lo: hi, hi: lo }
        }
    }

    pub fn allocate(&self) -> u16 {
        rand::thread_rng().gen_range(self.lo..=self.hi)
    }

    /// Two independent ports, one per participant. Distinct whenever
    /// the range allows it, so both sides can run on one machine.
    pub fn allocate_pair(&self) -> (u16, u16) {
        let first = self.allocate();
        if self.lo == self.hi {
            return (first, first);
        }
        loop {
            let second = self.allocate();
            if second != first {
                return (first, second);
            }
        }
    }
}

/// Builds the directed descriptor pair for one match:
/// `(host_descriptor, guest_descriptor)`.
pub fn descriptor_pair(
    game: GameId,
    host_addr: IpAddr,
    guest_addr: IpAddr,
    host_port: u16,
    guest_port: u16,
) -> (ServerEvent, ServerEvent) {
    let for_host = ServerEvent::P2pInfo {
        role: PeerRole::Host,
        peer_addr: guest_addr.to_string(),
        peer_port: guest_port,
        own_port: host_port,
        game,
    };
    let for_guest = ServerEvent::P2pInfo {
        role: PeerRole::Client,
        peer_addr: host_addr.to_string(),
        peer_port: host_port,
        own_port: guest_port,
        game,
    };
    (for_host, for_guest)
}
