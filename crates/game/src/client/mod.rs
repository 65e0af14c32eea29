mod clock;
mod config;
mod interpolation;
mod prediction;
mod session;

pub use clock::ServerClock;
pub use config::ClientConfig;
pub use interpolation::{
    DEFAULT_BUFFER_CAPACITY, InterpolationBuffer, InterpolationConfig, InterpolationEngine,
};
pub use prediction::{ClientPrediction, DEFAULT_HISTORY_CAPACITY, PredictedState, Reconciliation};
pub use session::{ClientStats, GameClient};
