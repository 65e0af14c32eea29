pub const DEFAULT_TICK_RATE: u32 = 64;

/// Remote entities are rendered this far, plus one tick, behind the newest snapshot.
pub const INTERPOLATION_OFFSET_MS: u64 = 100;

/// Maps a millisecond clock onto fixed simulation ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickClock {
    tick_rate: u32,
    tick_ms: u64,
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_RATE)
    }
}

impl TickClock {
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            tick_ms: 1000u64.div_ceil(u64::from(tick_rate)),
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn tick_ms(&self) -> u64 {
        self.tick_ms
    }

    pub fn dt(&self) -> f32 {
        self.tick_ms as f32 / 1000.0
    }

    pub fn time_to_tick(&self, ms: u64) -> u32 {
        u32::try_from(ms / self.tick_ms).unwrap_or(u32::MAX)
    }

    pub fn tick_to_time(&self, tick: u32) -> u64 {
        u64::from(tick) * self.tick_ms
    }

    /// The extra tick keeps a snapshot sent this tick inside the window.
    pub fn interpolation_offset_ticks(&self) -> u32 {
        self.time_to_tick(INTERPOLATION_OFFSET_MS + self.tick_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_duration_rounds_up() {
        let clock = TickClock::new(64);
        assert_eq!(clock.tick_ms(), 16);
        assert_eq!(TickClock::new(60).tick_ms(), 17);
        assert_eq!(TickClock::new(0).tick_rate(), 1);
        assert!((clock.dt() - 0.016).abs() < f32::EPSILON);
    }

    #[test]
    fn time_to_tick_is_monotonic() {
        let clock = TickClock::new(64);
        assert_eq!(clock.time_to_tick(0), 0);
        assert_eq!(clock.time_to_tick(15), 0);
        assert_eq!(clock.time_to_tick(16), 1);
        assert_eq!(clock.interpolation_offset_ticks(), 7);
        assert_eq!(TickClock::new(20).interpolation_offset_ticks(), 3);

        let mut last = 0;
        for ms in (0..10_000).step_by(7) {
            let tick = clock.time_to_tick(ms);
            assert!(tick >= last);
            last = tick;
        }
        assert_eq!(clock.time_to_tick(u64::MAX), u32::MAX);
    }
}
