use std::time::Duration;

use crate::net::{PacketLossSimulation, UdpConfig};
use crate::simulation::DEFAULT_TICK_RATE;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_rate: u32,
    pub max_peers: usize,
    /// Upper bound on how long one loop iteration waits for traffic.
    pub poll_timeout: Duration,
    pub peer_timeout: Duration,
    /// Keep a leaving peer's entity in the world with neutral controls.
    pub retain_disconnected_entities: bool,
    /// Server-driven entities spawned at startup.
    pub bots: u16,
    pub global_packet_loss: Option<PacketLossSimulation>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            max_peers: 32,
            poll_timeout: Duration::from_millis(1),
            peer_timeout: Duration::from_secs(10),
            retain_disconnected_entities: false,
            bots: 0,
            global_packet_loss: None,
        }
    }
}

impl ServerConfig {
    pub fn udp_config(&self) -> UdpConfig {
        UdpConfig {
            max_peers: self.max_peers,
            peer_timeout: self.peer_timeout,
            packet_loss: self.global_packet_loss,
            ..UdpConfig::default()
        }
    }
}
