use crate::net::{Message, PeerId, Transport, TransportError, TransportEvent};
use crate::simulation::TickClock;
use crate::snapshot::{Entity, EntitySnapshot, World};

use super::clock::ServerClock;
use super::config::ClientConfig;
use super::interpolation::{InterpolationConfig, InterpolationEngine};
use super::prediction::{ClientPrediction, Reconciliation};

#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    pub snapshots_received: u64,
    pub confirmed: u64,
    pub resimulations: u64,
    pub stale_snapshots: u64,
    pub messages_dropped: u64,
    pub inputs_sent: u64,
}

/// Client side of the sync loop: mirrors the server world, predicts the
/// controlled entity and interpolates the rest.
pub struct GameClient<T: Transport> {
    transport: T,
    server: PeerId,
    config: ClientConfig,
    clock: TickClock,
    server_clock: ServerClock,
    world: World,
    interpolation: InterpolationEngine,
    prediction: Option<ClientPrediction>,
    pending_control: Option<u16>,
    input: (f32, f32),
    connected: bool,
    stats: ClientStats,
}

impl<T: Transport> GameClient<T> {
    /// `server` is the peer id the transport assigned when connecting.
    pub fn new(transport: T, server: PeerId, config: ClientConfig) -> Self {
        let clock = TickClock::new(config.tick_rate);
        let interpolation = InterpolationEngine::new(InterpolationConfig {
            buffer_capacity: config.buffer_capacity,
            offset_ticks: clock.interpolation_offset_ticks(),
        });
        Self {
            transport,
            server,
            server_clock: ServerClock::new(clock.tick_ms(), config.clock_correction_rate),
            config,
            clock,
            world: World::new(),
            interpolation,
            prediction: None,
            pending_control: None,
            input: (0.0, 0.0),
            connected: false,
            stats: ClientStats::default(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    pub fn controlled_eid(&self) -> Option<u16> {
        self.prediction.as_ref().map(ClientPrediction::eid)
    }

    pub fn predicted_entity(&self) -> Option<&Entity> {
        self.prediction.as_ref().map(ClientPrediction::entity)
    }

    pub fn remote_pose(&self, eid: u16) -> Option<&EntitySnapshot> {
        self.interpolation.pose(eid)
    }

    pub fn remote_poses(&self) -> impl Iterator<Item = (u16, &EntitySnapshot)> {
        self.interpolation.poses()
    }

    pub fn estimated_server_tick(&self) -> Option<f64> {
        self.server_clock.estimate(self.transport.now_ms())
    }

    /// Throttle and steer for the controlled entity, applied from the next step on.
    pub fn set_input(&mut self, thr: f32, steer: f32) {
        self.input = (thr, steer);
    }

    /// One frame: drain the transport, step the prediction up to the estimated
    /// server tick, send the current input and resample remote entities.
    pub fn update(&mut self) -> Result<(), TransportError> {
        for event in self.transport.poll(self.config.poll_timeout)? {
            self.handle_event(event);
        }
        if !self.connected {
            return Ok(());
        }

        let Some(render_tick) = self.estimated_server_tick() else {
            return Ok(());
        };
        let dt = self.clock.dt();
        let (thr, steer) = self.input;

        if let Some(prediction) = &mut self.prediction {
            prediction.set_input(thr, steer);
            prediction.advance_to(render_tick.floor() as u32, dt);

            let (thr, steer) = prediction.input();
            let message = Message::Input {
                eid: prediction.eid(),
                thr,
                steer,
            };
            self.send(&message);
            self.stats.inputs_sent += 1;
        }

        self.interpolation.update(render_tick);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.connected {
            self.transport.disconnect(self.server);
        }
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { peer } if peer == self.server => {
                log::info!("Connected to server, joining");
                self.connected = true;
                self.send(&Message::Join);
            }
            TransportEvent::Received { peer, data, .. } if peer == self.server => {
                match Message::decode(&data) {
                    Ok(message) => self.handle_message(message),
                    Err(e) => {
                        log::warn!("Dropping message from server: {e}");
                        self.stats.messages_dropped += 1;
                    }
                }
            }
            TransportEvent::Disconnected { peer } if peer == self.server => {
                log::info!("Disconnected from server");
                self.reset();
            }
            other => log::trace!("Ignoring event from another peer: {other:?}"),
        }
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::NewEntity(entity) => self.handle_new_entity(entity),
            Message::SetControlledEntity { eid } => self.take_control(eid),
            Message::Snapshot { eid, snapshot } => self.handle_snapshot(eid, snapshot),
            Message::RemoveEntity { eid } => self.handle_remove(eid),
            other => {
                log::warn!("Unexpected {:?} message from server", other.kind());
                self.stats.messages_dropped += 1;
            }
        }
    }

    fn handle_new_entity(&mut self, entity: Entity) {
        if self.world.contains(entity.eid) {
            log::trace!("Entity {} already known", entity.eid);
            return;
        }
        let eid = entity.eid;
        self.observe_server_tick(entity.tick);
        self.interpolation.push_snapshot(eid, entity.snapshot());
        self.world.insert(entity);
        log::debug!("Entity {eid} added");

        if self.pending_control == Some(eid) {
            self.take_control(eid);
        }
    }

    fn take_control(&mut self, eid: u16) {
        let Some(entity) = self.world.get(eid) else {
            log::debug!("Control of unknown entity {eid} deferred");
            self.pending_control = Some(eid);
            return;
        };
        self.pending_control = None;
        self.interpolation.remove(eid);
        self.prediction = Some(ClientPrediction::new(
            entity.clone(),
            self.config.history_capacity,
        ));
        log::info!("Controlling entity {eid}");
    }

    fn handle_snapshot(&mut self, eid: u16, snapshot: EntitySnapshot) {
        self.stats.snapshots_received += 1;
        self.observe_server_tick(snapshot.tick);

        let Some(entity) = self.world.get_mut(eid) else {
            log::trace!("Snapshot for unknown entity {eid}");
            return;
        };
        if snapshot.tick >= entity.tick {
            entity.apply_snapshot(&snapshot);
        }

        match &mut self.prediction {
            Some(prediction) if prediction.eid() == eid => {
                match prediction.reconcile(&snapshot, self.clock.dt()) {
                    Reconciliation::Confirmed => self.stats.confirmed += 1,
                    Reconciliation::Stale => self.stats.stale_snapshots += 1,
                    Reconciliation::Corrected { .. } | Reconciliation::Snapped => {
                        self.stats.resimulations += 1;
                    }
                }
            }
            _ => self.interpolation.push_snapshot(eid, snapshot),
        }
    }

    fn handle_remove(&mut self, eid: u16) {
        self.world.remove(eid);
        self.interpolation.remove(eid);
        if self.controlled_eid() == Some(eid) {
            log::info!("Controlled entity {eid} removed");
            self.prediction = None;
        }
        if self.pending_control == Some(eid) {
            self.pending_control = None;
        }
    }

    fn observe_server_tick(&mut self, tick: u32) {
        let now = self.transport.now_ms();
        let rtt = self.transport.rtt_ms(self.server);
        self.server_clock.observe(tick, now, rtt);
    }

    fn reset(&mut self) {
        self.connected = false;
        self.world.clear();
        self.interpolation.clear();
        self.prediction = None;
        self.pending_control = None;
        self.server_clock.reset();
    }

    fn send(&mut self, message: &Message) {
        let data = message.encode();
        if let Err(e) = self.transport.send(self.server, message.channel(), &data) {
            log::warn!("Failed to send {:?} to server: {e}", message.kind());
        }
    }
}
