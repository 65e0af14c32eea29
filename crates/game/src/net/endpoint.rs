use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use super::protocol::MAX_PACKET_SIZE;
use super::simulator::NetworkSimulator;
use super::stats::NetworkStats;

/// Longest single blocking wait while simulated datagrams are queued.
const SIMULATOR_WAIT_CAP: Duration = Duration::from_millis(2);

/// A bound UDP socket plus outbound loss simulation and counters.
pub struct NetworkEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    stats: NetworkStats,
    simulator: NetworkSimulator,
    recv_buffer: [u8; MAX_PACKET_SIZE],
}

impl NetworkEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            stats: NetworkStats::default(),
            simulator: NetworkSimulator::new(),
            recv_buffer: [0u8; MAX_PACKET_SIZE],
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut NetworkStats {
        &mut self.stats
    }

    pub fn simulator_mut(&mut self) -> &mut NetworkSimulator {
        &mut self.simulator
    }

    pub fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<()> {
        if self.simulator.is_active() {
            if !self.simulator.enqueue_outbound(data.to_vec(), addr) {
                self.stats.packets_dropped += 1;
            }
            return self.flush();
        }
        self.transmit(data, addr)
    }

    /// Releases simulated datagrams whose delay has elapsed. Every due
    /// datagram is attempted; the last failure is returned.
    pub fn flush(&mut self) -> io::Result<()> {
        let mut result = Ok(());
        for (data, addr) in self.simulator.take_outbound() {
            if let Err(e) = self.transmit(&data, addr) {
                result = Err(e);
            }
        }
        result
    }

    fn transmit(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<()> {
        match self.socket.send_to(data, addr) {
            Ok(bytes) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += bytes as u64;
                Ok(())
            }
            // The kernel buffer is full; the datagram is lost like any other.
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.stats.packets_dropped += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Waits up to `timeout` for the first datagram, then drains the socket.
    pub fn receive(&mut self, timeout: Duration) -> io::Result<Vec<(Vec<u8>, SocketAddr)>> {
        let mut datagrams = Vec::new();

        let wait = match self.simulator.next_release() {
            Some(release) => timeout
                .min(release.saturating_duration_since(Instant::now()))
                .min(SIMULATOR_WAIT_CAP),
            None => timeout,
        };
        if !wait.is_zero() {
            self.socket.set_nonblocking(false)?;
            self.socket.set_read_timeout(Some(wait))?;
            let first = self.socket.recv_from(&mut self.recv_buffer);
            self.socket.set_nonblocking(true)?;
            match first {
                Ok((size, addr)) => self.accept(size, addr, &mut datagrams),
                Err(ref e) if is_transient(e) => {}
                Err(e) => return Err(e),
            }
        }

        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => self.accept(size, addr, &mut datagrams),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if is_transient(e) => continue,
                Err(e) => return Err(e),
            }
        }

        // Datagrams already read must reach the caller even if a release fails.
        if let Err(e) = self.flush() {
            self.stats.send_errors += 1;
            log::warn!("Failed to release delayed datagrams: {e}");
        }
        Ok(datagrams)
    }

    fn accept(&mut self, size: usize, addr: SocketAddr, out: &mut Vec<(Vec<u8>, SocketAddr)>) {
        self.stats.packets_received += 1;
        self.stats.bytes_received += size as u64;
        out.push((self.recv_buffer[..size].to_vec(), addr));
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionReset
    )
}
