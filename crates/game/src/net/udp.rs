use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::codec::{ByteReader, ByteWriter};

use super::connection::{ConnectionManager, ConnectionState};
use super::endpoint::NetworkEndpoint;
use super::protocol::MAX_PACKET_SIZE;
use super::stats::{NetworkStats, PacketLossSimulation};
use super::transport::{Channel, PeerId, Transport, TransportError, TransportEvent};

const FRAME_MAGIC: u16 = 0x534B;
/// Magic, frame kind and the reliable sequence number.
pub const FRAME_OVERHEAD: usize = 2 + 1 + 4;
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - FRAME_OVERHEAD;

#[derive(Debug, Clone)]
pub struct UdpConfig {
    pub max_peers: usize,
    pub peer_timeout: Duration,
    pub ping_interval: Duration,
    pub connect_retry: Duration,
    pub packet_loss: Option<PacketLossSimulation>,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            max_peers: 32,
            peer_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_millis(250),
            connect_retry: Duration::from_millis(200),
            packet_loss: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum FrameKind {
    Connect = 1,
    Accept = 2,
    Disconnect = 3,
    Reliable = 4,
    Ack = 5,
    Unreliable = 6,
    Ping = 7,
    Pong = 8,
}

impl TryFrom<u8> for FrameKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::Connect,
            2 => Self::Accept,
            3 => Self::Disconnect,
            4 => Self::Reliable,
            5 => Self::Ack,
            6 => Self::Unreliable,
            7 => Self::Ping,
            8 => Self::Pong,
            other => return Err(other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame<'a> {
    Connect,
    Accept,
    Disconnect,
    Reliable { sequence: u32, payload: &'a [u8] },
    Ack { sequence: u32 },
    Unreliable { payload: &'a [u8] },
    Ping { stamp: u32 },
    Pong { stamp: u32 },
}

impl<'a> Frame<'a> {
    fn kind(&self) -> FrameKind {
        match self {
            Self::Connect => FrameKind::Connect,
            Self::Accept => FrameKind::Accept,
            Self::Disconnect => FrameKind::Disconnect,
            Self::Reliable { .. } => FrameKind::Reliable,
            Self::Ack { .. } => FrameKind::Ack,
            Self::Unreliable { .. } => FrameKind::Unreliable,
            Self::Ping { .. } => FrameKind::Ping,
            Self::Pong { .. } => FrameKind::Pong,
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(FRAME_OVERHEAD);
        w.write_u16(FRAME_MAGIC);
        w.write_u8(self.kind() as u8);
        match self {
            Self::Connect | Self::Accept | Self::Disconnect => {}
            Self::Reliable { sequence, payload } => {
                w.write_u32(*sequence);
                w.write_bytes(payload);
            }
            Self::Ack { sequence } => w.write_u32(*sequence),
            Self::Unreliable { payload } => w.write_bytes(payload),
            Self::Ping { stamp } | Self::Pong { stamp } => w.write_u32(*stamp),
        }
        w.finish()
    }

    fn decode(data: &'a [u8]) -> Option<Self> {
        let mut r = ByteReader::new(data);
        if r.read_u16().ok()? != FRAME_MAGIC {
            return None;
        }
        let kind = FrameKind::try_from(r.read_u8().ok()?).ok()?;
        let frame = match kind {
            FrameKind::Connect => Self::Connect,
            FrameKind::Accept => Self::Accept,
            FrameKind::Disconnect => Self::Disconnect,
            FrameKind::Reliable => Self::Reliable {
                sequence: r.read_u32().ok()?,
                payload: r.rest(),
            },
            FrameKind::Ack => Self::Ack {
                sequence: r.read_u32().ok()?,
            },
            FrameKind::Unreliable => Self::Unreliable { payload: r.rest() },
            FrameKind::Ping => Self::Ping {
                stamp: r.read_u32().ok()?,
            },
            FrameKind::Pong => Self::Pong {
                stamp: r.read_u32().ok()?,
            },
        };
        Some(frame)
    }
}

/// `Transport` over a single UDP socket, usable as both listener and client.
pub struct UdpTransport {
    endpoint: NetworkEndpoint,
    connections: ConnectionManager,
    config: UdpConfig,
    start: Instant,
    events: Vec<TransportEvent>,
}

impl UdpTransport {
    pub fn bind<A: ToSocketAddrs>(addr: A, config: UdpConfig) -> Result<Self, TransportError> {
        let mut endpoint = NetworkEndpoint::bind(addr)?;
        endpoint.simulator_mut().set_global(config.packet_loss);
        Ok(Self {
            endpoint,
            connections: ConnectionManager::new(config.max_peers, config.peer_timeout),
            config,
            start: Instant::now(),
            events: Vec::new(),
        })
    }

    /// Starts a handshake with `addr`. `Connected` is reported by `poll` once accepted.
    pub fn connect<A: ToSocketAddrs>(&mut self, addr: A) -> Result<PeerId, TransportError> {
        let addr = addr.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
        })?;

        if let Some(peer) = self.connections.peer_for_addr(&addr) {
            return Ok(peer);
        }

        let peer = self
            .connections
            .insert(addr, ConnectionState::Connecting)
            .ok_or(TransportError::Full(self.connections.max_peers()))?;
        // Retried by `service` until accepted, like any lost Connect.
        self.send_frame(&Frame::Connect, addr);
        log::debug!("Connecting to {addr} as peer {peer}");
        Ok(peer)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn peer_addr(&self, peer: PeerId) -> Option<SocketAddr> {
        self.connections.get(peer).map(|c| c.addr)
    }

    pub fn connected_count(&self) -> usize {
        self.connections.connected_count()
    }

    pub fn config(&self) -> &UdpConfig {
        &self.config
    }

    pub fn set_packet_loss(&mut self, peer: PeerId, sim: PacketLossSimulation) {
        if let Some(addr) = self.peer_addr(peer) {
            self.endpoint.simulator_mut().set_config(addr, sim);
        }
    }

    pub fn stats(&self) -> NetworkStats {
        let mut stats = self.endpoint.stats().clone();
        let sampled: Vec<_> = self
            .connections
            .iter()
            .filter(|c| c.rtt.has_samples())
            .map(|c| (c.rtt.srtt(), c.rtt.rtt_var()))
            .collect();
        if !sampled.is_empty() {
            let n = sampled.len() as f32;
            stats.rtt_ms = sampled.iter().map(|s| s.0).sum::<f32>() / n;
            stats.rtt_variance = sampled.iter().map(|s| s.1).sum::<f32>() / n;
        }
        stats
    }

    /// Tells every peer we are leaving. Used on shutdown.
    pub fn shutdown(&mut self) {
        let peers: Vec<PeerId> = self.connections.iter().map(|c| c.peer).collect();
        for peer in peers {
            self.disconnect(peer);
        }
        if let Err(e) = self.endpoint.flush() {
            log::warn!("Failed to flush on shutdown: {e}");
        }
    }

    /// Sends a control frame. A failed send is logged and counted; the frame is
    /// treated as lost and recovered by the usual retries and timeouts.
    fn send_frame(&mut self, frame: &Frame<'_>, addr: SocketAddr) {
        self.send_datagram(&frame.encode(), addr);
    }

    fn send_datagram(&mut self, data: &[u8], addr: SocketAddr) {
        if let Err(e) = self.endpoint.send_to(data, addr) {
            self.endpoint.stats_mut().send_errors += 1;
            log::warn!("Failed to send to {addr}: {e}");
        }
    }

    fn handle_datagram(&mut self, data: &[u8], addr: SocketAddr) {
        let Some(frame) = Frame::decode(data) else {
            log::trace!("Dropping malformed datagram of {} bytes from {addr}", data.len());
            return;
        };

        let known = self.connections.peer_for_addr(&addr);
        if let Some(conn) = self.connections.get_by_addr_mut(&addr) {
            conn.touch();
        }

        match (frame, known) {
            (Frame::Connect, None) => match self.connections.insert(addr, ConnectionState::Connected) {
                Some(peer) => {
                    log::info!("Peer {peer} connected from {addr}");
                    self.events.push(TransportEvent::Connected { peer });
                    self.send_frame(&Frame::Accept, addr);
                }
                None => {
                    log::warn!("Refusing {addr}: peer limit reached");
                    self.send_frame(&Frame::Disconnect, addr);
                }
            },
            (Frame::Connect, Some(peer)) | (Frame::Accept, Some(peer)) => {
                if self.mark_connected(peer) {
                    log::info!("Connected to {addr} as peer {peer}");
                }
                if let Frame::Connect = frame {
                    self.send_frame(&Frame::Accept, addr);
                }
            }
            (Frame::Disconnect, Some(peer)) => {
                self.connections.remove(peer);
                log::info!("Peer {peer} at {addr} disconnected");
                self.events.push(TransportEvent::Disconnected { peer });
            }
            (Frame::Reliable { sequence, payload }, Some(peer)) => {
                self.mark_connected(peer);
                self.send_frame(&Frame::Ack { sequence }, addr);
                if let Some(conn) = self.connections.get_mut(peer) {
                    for data in conn.receive_tracker.record_received(sequence, payload.to_vec()) {
                        self.events.push(TransportEvent::Received {
                            peer,
                            channel: Channel::Reliable,
                            data,
                        });
                    }
                }
            }
            (Frame::Ack { sequence }, Some(peer)) => {
                if let Some(conn) = self.connections.get_mut(peer) {
                    conn.send_tracker.ack(sequence);
                }
            }
            (Frame::Unreliable { payload }, Some(peer)) => {
                self.mark_connected(peer);
                self.events.push(TransportEvent::Received {
                    peer,
                    channel: Channel::Unreliable,
                    data: payload.to_vec(),
                });
            }
            (Frame::Ping { stamp }, Some(_)) => {
                self.send_frame(&Frame::Pong { stamp }, addr);
            }
            (Frame::Pong { stamp }, Some(peer)) => {
                let rtt = (self.now_ms() as u32).wrapping_sub(stamp);
                if let Some(conn) = self.connections.get_mut(peer) {
                    conn.rtt.update(rtt as f32);
                }
            }
            (frame, None) => {
                log::trace!("Ignoring {:?} frame from unknown {addr}", frame.kind());
            }
        }
    }

    /// Promotes a connecting peer. Returns true on the transition.
    fn mark_connected(&mut self, peer: PeerId) -> bool {
        match self.connections.get_mut(peer) {
            Some(conn) if conn.state == ConnectionState::Connecting => {
                conn.state = ConnectionState::Connected;
                self.events.push(TransportEvent::Connected { peer });
                true
            }
            _ => false,
        }
    }

    fn service(&mut self) {
        for conn in self.connections.cleanup_timed_out() {
            log::info!("Peer {} at {} timed out", conn.peer, conn.addr);
            self.events.push(TransportEvent::Disconnected { peer: conn.peer });
        }

        let now = Instant::now();
        let stamp = self.now_ms() as u32;
        let mut outgoing = Vec::new();
        let mut resent = 0u64;

        for conn in self.connections.iter_mut() {
            match conn.state {
                ConnectionState::Connecting => {
                    if now.duration_since(conn.last_send_time) >= self.config.connect_retry {
                        conn.last_send_time = now;
                        outgoing.push((Frame::Connect.encode(), conn.addr));
                    }
                }
                ConnectionState::Connected => {
                    let rto = conn.rtt.rto();
                    for frame in conn.send_tracker.due(now, rto) {
                        resent += 1;
                        outgoing.push((frame, conn.addr));
                    }
                    if now.duration_since(conn.last_ping_time) >= self.config.ping_interval {
                        conn.last_ping_time = now;
                        outgoing.push((Frame::Ping { stamp }.encode(), conn.addr));
                    }
                }
            }
        }

        self.endpoint.stats_mut().packets_resent += resent;
        for (data, addr) in outgoing {
            self.send_datagram(&data, addr);
        }
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, peer: PeerId, channel: Channel, data: &[u8]) -> Result<(), TransportError> {
        if data.len() > MAX_PAYLOAD_SIZE {
            return Err(TransportError::Oversized {
                size: data.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let conn = self
            .connections
            .get_mut(peer)
            .ok_or(TransportError::UnknownPeer(peer))?;
        let addr = conn.addr;
        let now = Instant::now();
        conn.last_send_time = now;

        let frame = match channel {
            Channel::Reliable => {
                let sequence = conn.send_tracker.next_sequence();
                let frame = Frame::Reliable {
                    sequence,
                    payload: data,
                }
                .encode();
                conn.send_tracker.track(sequence, frame.clone(), now);
                frame
            }
            Channel::Unreliable => Frame::Unreliable { payload: data }.encode(),
        };
        self.endpoint.send_to(&frame, addr)?;
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Vec<TransportEvent>, TransportError> {
        let timeout = if self.events.is_empty() {
            timeout
        } else {
            Duration::ZERO
        };
        for (data, addr) in self.endpoint.receive(timeout)? {
            self.handle_datagram(&data, addr);
        }
        self.service();
        Ok(std::mem::take(&mut self.events))
    }

    fn disconnect(&mut self, peer: PeerId) {
        let Some(conn) = self.connections.remove(peer) else {
            return;
        };
        self.send_frame(&Frame::Disconnect, conn.addr);
        self.events.push(TransportEvent::Disconnected { peer });
    }

    fn rtt_ms(&self, peer: PeerId) -> Option<f32> {
        let conn = self.connections.get(peer)?;
        conn.rtt.has_samples().then(|| conn.rtt.srtt())
    }

    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let frame = Frame::Reliable {
            sequence: 7,
            payload: &[9, 9],
        };
        let bytes = frame.encode();
        assert_eq!(bytes, vec![0x53, 0x4B, 4, 0, 0, 0, 7, 9, 9]);
        assert_eq!(Frame::decode(&bytes), Some(frame));

        let ping = Frame::Ping { stamp: 0x01020304 }.encode();
        assert_eq!(Frame::decode(&ping), Some(Frame::Ping { stamp: 0x01020304 }));
    }

    #[test]
    fn test_frame_rejects_garbage() {
        assert_eq!(Frame::decode(&[]), None);
        assert_eq!(Frame::decode(&[0x53, 0x4B, 99]), None);
        assert_eq!(Frame::decode(&[0x00, 0x00, 1]), None);
        assert_eq!(Frame::decode(&[0x53, 0x4B, 5, 0]), None);
    }

    #[test]
    fn test_send_failure_does_not_abort_poll() {
        let config = UdpConfig {
            connect_retry: Duration::ZERO,
            ..UdpConfig::default()
        };
        let mut transport = UdpTransport::bind("127.0.0.1:0", config).unwrap();
        let mut remote = UdpTransport::bind("127.0.0.1:0", UdpConfig::default()).unwrap();

        // Sending to the broadcast address without SO_BROADCAST is refused by the socket.
        let refused = transport.connect("255.255.255.255:9").unwrap();
        remote.connect(transport.local_addr()).unwrap();

        let events = transport.poll(Duration::from_millis(200)).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TransportEvent::Connected { peer } if peer != refused));
        assert!(transport.stats().send_errors >= 1);
        assert_eq!(transport.connected_count(), 1);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut transport = UdpTransport::bind("127.0.0.1:0", UdpConfig::default()).unwrap();
        let peer = transport.connect("127.0.0.1:9").unwrap();
        let data = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        assert!(matches!(
            transport.send(peer, Channel::Unreliable, &data),
            Err(TransportError::Oversized { .. })
        ));
        assert!(matches!(
            transport.send(peer + 100, Channel::Unreliable, &[1]),
            Err(TransportError::UnknownPeer(_))
        ));
    }
}
