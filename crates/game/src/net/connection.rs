use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::tracking::{ReceiveTracker, RttEstimator, SendTracker};
use super::transport::PeerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Outbound handshake in flight.
    Connecting,
    Connected,
}

#[derive(Debug)]
pub struct PeerConnection {
    pub addr: SocketAddr,
    pub peer: PeerId,
    pub state: ConnectionState,
    pub last_receive_time: Instant,
    pub last_send_time: Instant,
    pub last_ping_time: Instant,
    pub rtt: RttEstimator,
    pub send_tracker: SendTracker,
    pub receive_tracker: ReceiveTracker,
}

impl PeerConnection {
    pub fn new(addr: SocketAddr, peer: PeerId, state: ConnectionState) -> Self {
        let now = Instant::now();
        Self {
            addr,
            peer,
            state,
            last_receive_time: now,
            last_send_time: now,
            last_ping_time: now,
            rtt: RttEstimator::new(),
            send_tracker: SendTracker::new(),
            receive_tracker: ReceiveTracker::new(),
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_receive_time.elapsed() > timeout
    }

    pub fn touch(&mut self) {
        self.last_receive_time = Instant::now();
    }
}

#[derive(Debug)]
pub struct ConnectionManager {
    peers_by_addr: HashMap<SocketAddr, PeerId>,
    peers: HashMap<PeerId, PeerConnection>,
    next_peer_id: PeerId,
    max_peers: usize,
    timeout: Duration,
}

impl ConnectionManager {
    pub fn new(max_peers: usize, timeout: Duration) -> Self {
        Self {
            peers_by_addr: HashMap::new(),
            peers: HashMap::new(),
            next_peer_id: 1,
            max_peers,
            timeout,
        }
    }

    /// Registers a new peer, or returns `None` when full.
    pub fn insert(&mut self, addr: SocketAddr, state: ConnectionState) -> Option<PeerId> {
        if self.peers.len() >= self.max_peers {
            return None;
        }

        let peer = self.next_peer_id;
        self.next_peer_id += 1;

        self.peers.insert(peer, PeerConnection::new(addr, peer, state));
        self.peers_by_addr.insert(addr, peer);
        Some(peer)
    }

    pub fn peer_for_addr(&self, addr: &SocketAddr) -> Option<PeerId> {
        self.peers_by_addr.get(addr).copied()
    }

    pub fn get(&self, peer: PeerId) -> Option<&PeerConnection> {
        self.peers.get(&peer)
    }

    pub fn get_mut(&mut self, peer: PeerId) -> Option<&mut PeerConnection> {
        self.peers.get_mut(&peer)
    }

    pub fn get_by_addr_mut(&mut self, addr: &SocketAddr) -> Option<&mut PeerConnection> {
        let peer = *self.peers_by_addr.get(addr)?;
        self.peers.get_mut(&peer)
    }

    pub fn remove(&mut self, peer: PeerId) -> Option<PeerConnection> {
        let conn = self.peers.remove(&peer)?;
        self.peers_by_addr.remove(&conn.addr);
        Some(conn)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerConnection> {
        self.peers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PeerConnection> {
        self.peers.values_mut()
    }

    pub fn cleanup_timed_out(&mut self) -> Vec<PeerConnection> {
        let timed_out: Vec<PeerId> = self
            .peers
            .values()
            .filter(|c| c.is_timed_out(self.timeout))
            .map(|c| c.peer)
            .collect();

        timed_out.into_iter().filter_map(|peer| self.remove(peer)).collect()
    }

    pub fn connected_count(&self) -> usize {
        self.peers
            .values()
            .filter(|c| c.state == ConnectionState::Connected)
            .count()
    }

    pub fn total_count(&self) -> usize {
        self.peers.len()
    }

    pub fn max_peers(&self) -> usize {
        self.max_peers
    }
}
