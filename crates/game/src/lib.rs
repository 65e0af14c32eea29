pub mod client;
pub mod codec;
pub mod net;
pub mod server;
pub mod simulation;
pub mod snapshot;

pub use client::{ClientConfig, ClientPrediction, GameClient, InterpolationBuffer, ServerClock};
pub use codec::{ByteReader, ByteWriter, CodecError, Interval, PackedFloat, PackedFloat2};
pub use net::{
    Channel, DEFAULT_PORT, LoopbackNetwork, LoopbackTransport, Message, MessageKind, PeerId,
    ProtocolError, Transport, TransportError, TransportEvent, UdpConfig, UdpTransport,
};
pub use server::{GameServer, ServerConfig, ServerEvent};
pub use simulation::{DEFAULT_TICK_RATE, TickClock, simulate_entity};
pub use snapshot::{Color, Entity, EntitySnapshot, SnapshotBuffer, World};
