use std::time::Duration;

use crate::simulation::DEFAULT_TICK_RATE;

use super::interpolation::DEFAULT_BUFFER_CAPACITY;
use super::prediction::DEFAULT_HISTORY_CAPACITY;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub tick_rate: u32,
    pub poll_timeout: Duration,
    /// Ticks of predicted state and input kept for reconciliation.
    pub history_capacity: usize,
    pub buffer_capacity: usize,
    /// Fraction of the observed error applied to the server clock estimate per snapshot.
    pub clock_correction_rate: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            poll_timeout: Duration::from_millis(1),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            clock_correction_rate: 0.1,
        }
    }
}
