/// Estimate of the server tick as a function of local time.
///
/// Tracks `server_tick - local_ms / tick_ms` and nudges it toward every new
/// observation, so the estimate advances smoothly between snapshots.
#[derive(Debug, Clone)]
pub struct ServerClock {
    tick_ms: f64,
    correction_rate: f64,
    offset: Option<f64>,
}

impl ServerClock {
    pub fn new(tick_ms: u64, correction_rate: f64) -> Self {
        Self {
            tick_ms: tick_ms.max(1) as f64,
            correction_rate: correction_rate.clamp(0.0, 1.0),
            offset: None,
        }
    }

    /// Records that the server was at `server_tick` half a round trip before `local_ms`.
    pub fn observe(&mut self, server_tick: u32, local_ms: u64, rtt_ms: Option<f32>) {
        let one_way = f64::from(rtt_ms.unwrap_or(0.0).max(0.0)) / 2.0;
        let observed =
            f64::from(server_tick) + one_way / self.tick_ms - local_ms as f64 / self.tick_ms;
        match &mut self.offset {
            Some(offset) => *offset += (observed - *offset) * self.correction_rate,
            None => self.offset = Some(observed),
        }
    }

    pub fn estimate(&self, local_ms: u64) -> Option<f64> {
        self.offset
            .map(|offset| (offset + local_ms as f64 / self.tick_ms).max(0.0))
    }

    pub fn is_synced(&self) -> bool {
        self.offset.is_some()
    }

    pub fn reset(&mut self) {
        self.offset = None;
    }
}
