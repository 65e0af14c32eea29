use crate::net::PeerId;

#[derive(Debug, Clone)]
pub enum ServerEvent {
    PeerConnected {
        peer: PeerId,
    },
    PeerJoined {
        peer: PeerId,
        eid: u16,
    },
    DuplicateJoin {
        peer: PeerId,
        eid: u16,
    },
    PeerDisconnected {
        peer: PeerId,
        eid: Option<u16>,
        reason: DisconnectReason,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Left,
    Kicked,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Left => "disconnected",
            DisconnectReason::Kicked => "kicked",
        }
    }
}
