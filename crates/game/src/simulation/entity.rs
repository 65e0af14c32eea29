use std::f32::consts::{PI, TAU};

use glam::Vec2;

use crate::codec::Interval;
use crate::snapshot::Entity;

pub const MAX_SPEED: f32 = 6.0;
pub const ACCELERATION: f32 = 12.0;
/// Radians per second at full steer.
pub const TURN_RATE: f32 = 3.0;

pub const WORLD_BOUNDS_X: Interval = Interval::new(-16.0, 16.0);
pub const WORLD_BOUNDS_Y: Interval = Interval::new(-8.0, 8.0);
pub const ORIENTATION_RANGE: Interval = Interval::new(-PI, PI);

/// Wraps into `[-PI, PI)`.
pub fn wrap_angle(a: f32) -> f32 {
    let r = (a + PI).rem_euclid(TAU);
    // rem_euclid can round up to TAU for tiny negative inputs.
    if r >= TAU { -PI } else { r - PI }
}

pub fn clamp_to_world(pos: Vec2) -> Vec2 {
    Vec2::new(WORLD_BOUNDS_X.clamp(pos.x), WORLD_BOUNDS_Y.clamp(pos.y))
}

/// Advances one tick of `dt` seconds. Does not touch `entity.tick`.
pub fn simulate_entity(entity: &mut Entity, dt: f32) {
    entity.ori = wrap_angle(entity.ori + entity.steer * TURN_RATE * dt);

    let max_delta = ACCELERATION * dt;
    let target = entity.thr * MAX_SPEED;
    entity.speed += (target - entity.speed).clamp(-max_delta, max_delta);

    let heading = Vec2::from_angle(entity.ori);
    entity.pos = clamp_to_world(entity.pos + heading * entity.speed * dt);
}

/// Steps `entity` forward until it reaches `tick`, one call per tick.
/// Returns the number of steps taken.
pub fn catch_up(entity: &mut Entity, tick: u32, dt: f32) -> u32 {
    let mut steps = 0;
    while entity.tick < tick {
        simulate_entity(entity, dt);
        entity.tick += 1;
        steps += 1;
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.016;

    fn driven(thr: f32, steer: f32) -> Entity {
        let mut e = Entity::new(0, 0);
        e.set_controls(thr, steer);
        e
    }

    #[test]
    fn identical_inputs_identical_results() {
        let mut a = driven(0.8, -0.3);
        let mut b = a.clone();
        for _ in 0..500 {
            simulate_entity(&mut a, DT);
            simulate_entity(&mut b, DT);
        }
        assert_eq!(a.pos.x.to_bits(), b.pos.x.to_bits());
        assert_eq!(a.pos.y.to_bits(), b.pos.y.to_bits());
        assert_eq!(a.ori.to_bits(), b.ori.to_bits());
        assert_eq!(a.speed.to_bits(), b.speed.to_bits());
    }

    #[test]
    fn speed_is_rate_limited() {
        let mut e = driven(1.0, 0.0);
        simulate_entity(&mut e, DT);
        assert!((e.speed - ACCELERATION * DT).abs() < 1e-6);

        for _ in 0..1000 {
            simulate_entity(&mut e, DT);
        }
        assert!((e.speed - MAX_SPEED).abs() < 1e-4);
    }

    #[test]
    fn position_stays_in_bounds() {
        let mut e = driven(1.0, 0.0);
        for _ in 0..2000 {
            simulate_entity(&mut e, DT);
        }
        assert_eq!(e.pos.x, WORLD_BOUNDS_X.hi);
        assert_eq!(e.pos.y, 0.0);
    }

    #[test]
    fn orientation_wraps() {
        assert!((wrap_angle(PI + 0.5) - (-PI + 0.5)).abs() < 1e-5);
        assert!((wrap_angle(-PI - 0.5) - (PI - 0.5)).abs() < 1e-5);
        assert_eq!(wrap_angle(0.25), 0.25);

        let mut e = driven(0.0, 1.0);
        for _ in 0..500 {
            simulate_entity(&mut e, DT);
            assert!(e.ori >= -PI && e.ori < PI);
        }
    }

    #[test]
    fn catch_up_runs_missed_ticks() {
        let mut e = driven(1.0, 0.0);
        assert_eq!(catch_up(&mut e, 5, DT), 5);
        assert_eq!(e.tick, 5);
        assert_eq!(catch_up(&mut e, 3, DT), 0);
        assert_eq!(e.tick, 5);
    }
}
