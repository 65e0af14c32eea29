mod connection;
mod endpoint;
mod loopback;
pub mod protocol;
mod simulator;
mod stats;
mod tracking;
mod transport;
mod udp;

pub use connection::{ConnectionManager, ConnectionState, PeerConnection};
pub use endpoint::NetworkEndpoint;
pub use loopback::{LoopbackAddr, LoopbackNetwork, LoopbackTransport};
pub use protocol::{
    DEFAULT_PORT, MAX_PACKET_SIZE, Message, MessageKind, ProtocolError, WIRE_ENTITY_SIZE,
    WireEntity, correct_snapshot, peek_kind, quantized_controls, snapshot_matches,
};
pub use simulator::NetworkSimulator;
pub use stats::{NetworkStats, PacketLossSimulation, rand_percent, rand_range, rand_u64};
pub use tracking::{ReceiveTracker, RttEstimator, SendTracker, sequence_greater_than};
pub use transport::{Channel, PeerId, Transport, TransportError, TransportEvent};
pub use udp::{MAX_PAYLOAD_SIZE, UdpConfig, UdpTransport};
