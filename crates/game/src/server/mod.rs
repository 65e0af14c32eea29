mod authority;
mod bots;
mod config;
mod events;

pub use authority::{GameServer, PeerInfo, PeerState, ServerStats};
pub use bots::{ARRIVAL_RADIUS, BotPilot, controls_toward};
pub use config::ServerConfig;
pub use events::{DisconnectReason, ServerEvent};
