use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;

use glam::Vec2;

use crate::net::rand_range;
use crate::simulation::{WORLD_BOUNDS_X, WORLD_BOUNDS_Y, wrap_angle};
use crate::snapshot::Entity;

/// A bot closer than this to its target picks a new one.
pub const ARRIVAL_RADIUS: f32 = 1.0;
/// Heading error, in radians, that maps to full steer.
const FULL_STEER_ANGLE: f32 = 0.5;
const MIN_THROTTLE: f32 = 0.2;
const TARGET_MARGIN: f32 = 1.0;

/// Server-driven entities wandering between random targets.
///
/// Bots only ever set throttle and steer, so they move through the same
/// `simulate_entity` step as player-controlled entities.
#[derive(Debug, Default)]
pub struct BotPilot {
    targets: HashMap<u16, Vec2>,
}

impl BotPilot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, eid: u16) {
        self.targets.insert(eid, random_target());
    }

    pub fn remove(&mut self, eid: u16) -> bool {
        self.targets.remove(&eid).is_some()
    }

    pub fn is_bot(&self, eid: u16) -> bool {
        self.targets.contains_key(&eid)
    }

    pub fn target(&self, eid: u16) -> Option<Vec2> {
        self.targets.get(&eid).copied()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Sets the controls of `entity` if it is a bot, retargeting on arrival.
    pub fn steer(&mut self, entity: &mut Entity) {
        let Some(target) = self.targets.get_mut(&entity.eid) else {
            return;
        };
        if entity.pos.distance(*target) < ARRIVAL_RADIUS {
            *target = random_target();
            log::trace!("Bot {} heading to ({:.1}, {:.1})", entity.eid, target.x, target.y);
        }
        let (thr, steer) = controls_toward(entity, *target);
        entity.set_controls(thr, steer);
    }
}

/// Throttle and steer that turn `entity` toward `target`, easing off the
/// throttle while the heading is far off so it does not circle the target.
pub fn controls_toward(entity: &Entity, target: Vec2) -> (f32, f32) {
    let to_target = target - entity.pos;
    let error = wrap_angle(to_target.y.atan2(to_target.x) - entity.ori);
    let steer = (error / FULL_STEER_ANGLE).clamp(-1.0, 1.0);
    let thr = if error.abs() >= FRAC_PI_2 {
        MIN_THROTTLE
    } else {
        error.cos().max(MIN_THROTTLE)
    };
    (thr, steer)
}

fn random_target() -> Vec2 {
    Vec2::new(
        rand_range(WORLD_BOUNDS_X.lo + TARGET_MARGIN, WORLD_BOUNDS_X.hi - TARGET_MARGIN),
        rand_range(WORLD_BOUNDS_Y.lo + TARGET_MARGIN, WORLD_BOUNDS_Y.hi - TARGET_MARGIN),
    )
}
