#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    pub loss_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
}

impl PacketLossSimulation {
    pub fn should_drop(&self) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        rand_percent() * 100.0 < self.loss_percent
    }

    pub fn delay_ms(&self) -> u32 {
        if !self.enabled || self.max_latency_ms == 0 {
            return 0;
        }
        let base = self.min_latency_ms;
        let range = self.max_latency_ms.saturating_sub(self.min_latency_ms);
        let jitter = if self.jitter_ms > 0 {
            (rand_percent() * self.jitter_ms as f32) as u32
        } else {
            0
        };
        base + (rand_percent() * range as f32) as u32 + jitter
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub packets_resent: u64,
    /// Sends the socket rejected with something other than a full buffer.
    pub send_errors: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub rtt_ms: f32,
    pub rtt_variance: f32,
}

/// Uniform in `[0, 1]`.
pub fn rand_percent() -> f32 {
    rand_u64() as f32 / u64::MAX as f32
}

pub fn rand_u64() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hash, Hasher};
    use std::time::Instant;

    let mut hasher = RandomState::new().build_hasher();
    Instant::now().hash(&mut hasher);
    hasher.finish()
}

pub fn rand_range(lo: f32, hi: f32) -> f32 {
    lo + rand_percent() * (hi - lo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_simulation_is_inert() {
        let sim = PacketLossSimulation {
            loss_percent: 100.0,
            max_latency_ms: 50,
            ..Default::default()
        };
        assert!(!sim.should_drop());
        assert_eq!(sim.delay_ms(), 0);
    }

    #[test]
    fn test_full_loss_drops_everything() {
        let sim = PacketLossSimulation {
            enabled: true,
            loss_percent: 100.0,
            ..Default::default()
        };
        assert!((0..32).all(|_| sim.should_drop()));
    }

    #[test]
    fn test_latency_within_bounds() {
        let sim = PacketLossSimulation {
            enabled: true,
            min_latency_ms: 20,
            max_latency_ms: 40,
            jitter_ms: 5,
            ..Default::default()
        };
        for _ in 0..64 {
            let delay = sim.delay_ms();
            assert!((20..=45).contains(&delay), "delay {delay}");
        }
    }

    #[test]
    fn test_rand_range() {
        for _ in 0..64 {
            let v = rand_range(-2.0, 3.0);
            assert!((-2.0..=3.0).contains(&v));
        }
    }
}
