use std::io;
use std::time::Duration;

use thiserror::Error;

pub type PeerId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Channel {
    /// Delivered once, in send order.
    Reliable = 0,
    /// Best effort, may be dropped or reordered.
    Unreliable = 1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected {
        peer: PeerId,
    },
    Received {
        peer: PeerId,
        channel: Channel,
        data: Vec<u8>,
    },
    Disconnected {
        peer: PeerId,
    },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),
    #[error("datagram of {size} bytes exceeds the {max} byte limit")]
    Oversized { size: usize, max: usize },
    #[error("peer limit of {0} reached")]
    Full(usize),
}

/// Message-oriented datagram transport driven by a single poll loop.
pub trait Transport {
    fn send(&mut self, peer: PeerId, channel: Channel, data: &[u8]) -> Result<(), TransportError>;

    /// Waits at most `timeout` for traffic and returns every pending event.
    fn poll(&mut self, timeout: Duration) -> Result<Vec<TransportEvent>, TransportError>;

    /// Drops the peer. A `Disconnected` event for it is reported by the next poll.
    fn disconnect(&mut self, peer: PeerId);

    fn rtt_ms(&self, peer: PeerId) -> Option<f32>;

    /// Monotonic milliseconds since the transport was created.
    fn now_ms(&self) -> u64;
}
