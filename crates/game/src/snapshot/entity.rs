use glam::Vec2;

pub const INVALID_ENTITY: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub const fn from_bytes(b: [u8; 4]) -> Self {
        Self {
            r: b[0],
            g: b[1],
            b: b[2],
            a: b[3],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub color: Color,
    pub pos: Vec2,
    pub speed: f32,
    pub ori: f32,
    pub thr: f32,
    pub steer: f32,
    pub eid: u16,
    /// Last tick this entity was simulated to.
    pub tick: u32,
}

impl Entity {
    pub fn new(eid: u16, tick: u32) -> Self {
        Self {
            color: Color::WHITE,
            pos: Vec2::ZERO,
            speed: 0.0,
            ori: 0.0,
            thr: 0.0,
            steer: 0.0,
            eid,
            tick,
        }
    }

    pub fn spawned(eid: u16, tick: u32, pos: Vec2, ori: f32, color: Color) -> Self {
        Self {
            color,
            pos,
            ori,
            ..Self::new(eid, tick)
        }
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            tick: self.tick,
            pos: self.pos,
            ori: self.ori,
        }
    }

    /// Overwrites pose and tick; speed and controls are left alone.
    pub fn apply_snapshot(&mut self, snapshot: &EntitySnapshot) {
        self.tick = snapshot.tick;
        self.pos = snapshot.pos;
        self.ori = snapshot.ori;
    }

    pub fn set_controls(&mut self, thr: f32, steer: f32) {
        self.thr = sanitize_control(thr);
        self.steer = sanitize_control(steer);
    }

    pub fn clear_controls(&mut self) {
        self.thr = 0.0;
        self.steer = 0.0;
    }

    pub fn is_valid(&self) -> bool {
        self.eid != INVALID_ENTITY
    }
}

fn sanitize_control(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntitySnapshot {
    pub tick: u32,
    pub pos: Vec2,
    pub ori: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityInput {
    pub tick: u32,
    pub thr: f32,
    pub steer: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controls_are_clamped() {
        let mut entity = Entity::new(3, 0);
        entity.set_controls(4.0, f32::NAN);
        assert_eq!(entity.thr, 1.0);
        assert_eq!(entity.steer, 0.0);

        entity.set_controls(-0.5, -2.0);
        assert_eq!((entity.thr, entity.steer), (-0.5, -1.0));
    }

    #[test]
    fn snapshot_keeps_speed() {
        let mut entity = Entity::spawned(1, 10, Vec2::new(1.0, 2.0), 0.5, Color::rgb(1, 2, 3));
        entity.speed = 3.0;

        let snap = EntitySnapshot {
            tick: 12,
            pos: Vec2::new(-1.0, 0.0),
            ori: -0.25,
        };
        entity.apply_snapshot(&snap);

        assert_eq!(entity.snapshot(), snap);
        assert_eq!(entity.speed, 3.0);
        assert!(!Entity::new(INVALID_ENTITY, 0).is_valid());
    }
}
