use glam::Vec2;

use crate::net::{correct_snapshot, quantized_controls, snapshot_matches};
use crate::simulation::simulate_entity;
use crate::snapshot::{Entity, EntityInput, EntitySnapshot, SnapshotBuffer, Ticked};

pub const DEFAULT_HISTORY_CAPACITY: usize = 256;

/// Predicted pose plus the speed needed to resume simulation from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedState {
    pub tick: u32,
    pub pos: Vec2,
    pub ori: f32,
    pub speed: f32,
}

impl PredictedState {
    fn of(entity: &Entity) -> Self {
        Self {
            tick: entity.tick,
            pos: entity.pos,
            ori: entity.ori,
            speed: entity.speed,
        }
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            tick: self.tick,
            pos: self.pos,
            ori: self.ori,
        }
    }
}

impl Ticked for PredictedState {
    fn tick(&self) -> u32 {
        self.tick
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Older than a snapshot already processed.
    Stale,
    Confirmed,
    Corrected { replayed: u32 },
    /// Too far ahead of the prediction to step to; the entity jumped to the server state.
    Snapped,
}

/// Client-side prediction for the locally controlled entity.
#[derive(Debug)]
pub struct ClientPrediction {
    entity: Entity,
    history: SnapshotBuffer<PredictedState>,
    inputs: SnapshotBuffer<EntityInput>,
    last_acked: Option<u32>,
    resimulations: u64,
}

impl ClientPrediction {
    pub fn new(entity: Entity, capacity: usize) -> Self {
        let mut history = SnapshotBuffer::new(capacity);
        history.push(PredictedState::of(&entity));
        Self {
            entity,
            history,
            inputs: SnapshotBuffer::new(capacity),
            last_acked: None,
            resimulations: 0,
        }
    }

    pub fn eid(&self) -> u16 {
        self.entity.eid
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn tick(&self) -> u32 {
        self.entity.tick
    }

    pub fn resimulations(&self) -> u64 {
        self.resimulations
    }

    pub fn predicted(&self, tick: u32) -> Option<&PredictedState> {
        self.history.get(tick)
    }

    /// Sets the controls used for upcoming steps, quantized the way the server will see them.
    pub fn set_input(&mut self, thr: f32, steer: f32) {
        let (thr, steer) = quantized_controls(thr, steer);
        self.entity.set_controls(thr, steer);
    }

    pub fn input(&self) -> (f32, f32) {
        (self.entity.thr, self.entity.steer)
    }

    /// Simulates up to `tick`, recording each applied input and resulting state.
    pub fn advance_to(&mut self, tick: u32, dt: f32) -> u32 {
        let mut steps = 0;
        while self.entity.tick < tick {
            self.step(dt);
            steps += 1;
        }
        steps
    }

    fn step(&mut self, dt: f32) {
        simulate_entity(&mut self.entity, dt);
        self.entity.tick += 1;
        self.inputs.push(EntityInput {
            tick: self.entity.tick,
            thr: self.entity.thr,
            steer: self.entity.steer,
        });
        self.history.push(PredictedState::of(&self.entity));
    }

    /// Checks a server snapshot of the controlled entity against the prediction
    /// for the same tick, replaying buffered inputs when they disagree.
    pub fn reconcile(&mut self, server: &EntitySnapshot, dt: f32) -> Reconciliation {
        if self.last_acked.is_some_and(|t| server.tick < t) {
            return Reconciliation::Stale;
        }
        self.last_acked = Some(server.tick);

        if server.tick > self.entity.tick {
            let gap = (server.tick - self.entity.tick) as usize;
            if gap >= self.history.capacity() {
                self.snap_to(server);
                return Reconciliation::Snapped;
            }
            self.advance_to(server.tick, dt);
        }

        match self.history.get(server.tick).copied() {
            Some(predicted) if snapshot_matches(&predicted.snapshot(), server) => {
                self.history.prune_before(server.tick);
                self.inputs.prune_before(server.tick);
                Reconciliation::Confirmed
            }
            Some(predicted) => {
                let base = correct_snapshot(&predicted.snapshot(), server);
                self.resimulate(&base, predicted.speed, dt)
            }
            // Older than the history window.
            None => {
                let speed = self.entity.speed;
                self.resimulate(server, speed, dt)
            }
        }
    }

    fn snap_to(&mut self, server: &EntitySnapshot) {
        self.entity.apply_snapshot(server);
        self.history.clear();
        self.inputs.clear();
        self.history.push(PredictedState::of(&self.entity));
    }

    /// Restarts from `base` and replays every recorded input after its tick.
    fn resimulate(&mut self, base: &EntitySnapshot, speed: f32, dt: f32) -> Reconciliation {
        let (thr, steer) = self.input();
        let replay: Vec<EntityInput> = self.inputs.after(base.tick).into_iter().copied().collect();

        self.history.prune_before(base.tick);
        self.inputs.prune_before(base.tick);

        self.entity.apply_snapshot(base);
        self.entity.speed = speed;
        self.history.push(PredictedState::of(&self.entity));

        let mut replayed = 0;
        for input in replay {
            if input.tick != self.entity.tick + 1 {
                break;
            }
            self.entity.thr = input.thr;
            self.entity.steer = input.steer;
            self.step(dt);
            replayed += 1;
        }

        self.entity.thr = thr;
        self.entity.steer = steer;
        self.resimulations += 1;
        log::debug!(
            "Resimulated entity {} from tick {} ({replayed} inputs)",
            self.entity.eid,
            base.tick
        );
        Reconciliation::Corrected { replayed }
    }
}
