use std::f32::consts::TAU;

use clap::ValueEnum;

/// Scripted stand-in for keyboard input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DrivePattern {
    /// Neutral controls.
    Idle,
    /// Full throttle, no steering.
    Forward,
    /// Constant throttle with a constant turn.
    Circle,
    /// Throttle with steering that flips sign every period.
    Zigzag,
}

const ZIGZAG_PERIOD_SECS: f32 = 1.5;
const CIRCLE_THROTTLE: f32 = 0.6;
const CIRCLE_STEER: f32 = 0.5;

impl DrivePattern {
    /// Throttle and steer at `t` seconds since the pattern started.
    pub fn controls(self, t: f32) -> (f32, f32) {
        match self {
            DrivePattern::Idle => (0.0, 0.0),
            DrivePattern::Forward => (1.0, 0.0),
            DrivePattern::Circle => (CIRCLE_THROTTLE, CIRCLE_STEER),
            DrivePattern::Zigzag => {
                let phase = (t / ZIGZAG_PERIOD_SECS).rem_euclid(2.0);
                // Ease into each turn instead of flipping instantly.
                let steer = (phase * TAU / 2.0).sin().signum() * (phase.fract() * 4.0).min(1.0);
                (0.8, steer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_stay_in_control_range() {
        for pattern in DrivePattern::value_variants() {
            for step in 0..200 {
                let (thr, steer) = pattern.controls(step as f32 * 0.05);
                assert!((-1.0..=1.0).contains(&thr), "{pattern:?} thr {thr}");
                assert!((-1.0..=1.0).contains(&steer), "{pattern:?} steer {steer}");
            }
        }
    }

    #[test]
    fn zigzag_alternates() {
        let (_, left) = DrivePattern::Zigzag.controls(1.0);
        let (_, right) = DrivePattern::Zigzag.controls(1.0 + ZIGZAG_PERIOD_SECS);
        assert!(left > 0.0);
        assert!(right < 0.0);
    }
}
