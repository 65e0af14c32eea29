use std::collections::{HashMap, VecDeque};

use crate::simulation::wrap_angle;
use crate::snapshot::EntitySnapshot;

pub const DEFAULT_BUFFER_CAPACITY: usize = 64;

/// Tick-ordered snapshots of one remote entity.
#[derive(Debug, Clone)]
pub struct InterpolationBuffer {
    snapshots: VecDeque<EntitySnapshot>,
    capacity: usize,
    /// Tick of the newest entry already consumed by eviction.
    evicted_up_to: Option<u32>,
}

impl InterpolationBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
            evicted_up_to: None,
        }
    }

    /// Inserts in tick order. Duplicate ticks and ticks the render time has
    /// already passed are dropped.
    pub fn push(&mut self, snapshot: EntitySnapshot) -> bool {
        if let Some(evicted) = self.evicted_up_to {
            // After an eviction the front is at or behind render time.
            let behind_front = self.snapshots.front().is_some_and(|f| snapshot.tick < f.tick);
            if snapshot.tick <= evicted || behind_front {
                return false;
            }
        }
        let slot = self.snapshots.partition_point(|s| s.tick < snapshot.tick);
        if self.snapshots.get(slot).is_some_and(|s| s.tick == snapshot.tick) {
            return false;
        }
        self.snapshots.insert(slot, snapshot);

        while self.snapshots.len() > self.capacity {
            self.evict_front();
        }
        true
    }

    fn evict_front(&mut self) {
        if let Some(old) = self.snapshots.pop_front() {
            self.evicted_up_to = Some(old.tick);
        }
    }

    /// Pose at `render_tick`. With fewer than two entries the last known pose is held.
    pub fn sample(&mut self, render_tick: f64) -> Option<EntitySnapshot> {
        let first = *self.snapshots.front()?;
        if render_tick < f64::from(first.tick) {
            return Some(first);
        }

        while self.snapshots.len() >= 2
            && self
                .snapshots
                .get(1)
                .is_some_and(|b| render_tick >= f64::from(b.tick))
        {
            self.evict_front();
        }

        let a = *self.snapshots.front()?;
        let Some(&b) = self.snapshots.get(1) else {
            return Some(a);
        };
        if a.tick == b.tick {
            return Some(a);
        }

        let t = ((render_tick - f64::from(a.tick)) / f64::from(b.tick - a.tick)) as f32;
        Some(lerp_snapshot(&a, &b, t.clamp(0.0, 1.0), render_tick))
    }

    pub fn latest(&self) -> Option<&EntitySnapshot> {
        self.snapshots.back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

fn lerp_snapshot(a: &EntitySnapshot, b: &EntitySnapshot, t: f32, render_tick: f64) -> EntitySnapshot {
    EntitySnapshot {
        tick: render_tick.max(0.0) as u32,
        pos: a.pos.lerp(b.pos, t),
        // Shortest arc, so headings crossing +-PI do not spin the long way.
        ori: wrap_angle(a.ori + wrap_angle(b.ori - a.ori) * t),
    }
}

#[derive(Debug, Clone)]
pub struct InterpolationConfig {
    pub buffer_capacity: usize,
    /// Ticks added to every remote snapshot so rendering trails the newest data.
    pub offset_ticks: u32,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            offset_ticks: 0,
        }
    }
}

/// Interpolation buffers and sampled poses for every remote entity.
#[derive(Debug)]
pub struct InterpolationEngine {
    config: InterpolationConfig,
    buffers: HashMap<u16, InterpolationBuffer>,
    poses: HashMap<u16, EntitySnapshot>,
}

impl InterpolationEngine {
    pub fn new(config: InterpolationConfig) -> Self {
        Self {
            config,
            buffers: HashMap::new(),
            poses: HashMap::new(),
        }
    }

    /// Queues a snapshot stamped with server time; the render offset is applied here.
    pub fn push_snapshot(&mut self, eid: u16, snapshot: EntitySnapshot) {
        let shifted = EntitySnapshot {
            tick: snapshot.tick.saturating_add(self.config.offset_ticks),
            ..snapshot
        };
        self.buffers
            .entry(eid)
            .or_insert_with(|| InterpolationBuffer::new(self.config.buffer_capacity))
            .push(shifted);
        self.poses.entry(eid).or_insert(snapshot);
    }

    pub fn remove(&mut self, eid: u16) {
        self.buffers.remove(&eid);
        self.poses.remove(&eid);
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
        self.poses.clear();
    }

    /// Resamples every buffer. Stored poses carry the server tick they show.
    pub fn update(&mut self, render_tick: f64) {
        let offset = self.config.offset_ticks;
        for (&eid, buffer) in &mut self.buffers {
            if let Some(pose) = buffer.sample(render_tick) {
                let tick = pose.tick.saturating_sub(offset);
                self.poses.insert(eid, EntitySnapshot { tick, ..pose });
            }
        }
    }

    pub fn pose(&self, eid: u16) -> Option<&EntitySnapshot> {
        self.poses.get(&eid)
    }

    pub fn poses(&self) -> impl Iterator<Item = (u16, &EntitySnapshot)> {
        self.poses.iter().map(|(&eid, pose)| (eid, pose))
    }

    pub fn buffer(&self, eid: u16) -> Option<&InterpolationBuffer> {
        self.buffers.get(&eid)
    }

    pub fn entity_count(&self) -> usize {
        self.buffers.len()
    }
}
