use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::Vec2;

use crate::net::{
    Message, PeerId, Transport, TransportError, TransportEvent, rand_range, rand_u64,
};
use crate::simulation::{TickClock, WORLD_BOUNDS_X, WORLD_BOUNDS_Y, catch_up, wrap_angle};
use crate::snapshot::{Color, Entity, World};

use super::bots::BotPilot;
use super::config::ServerConfig;
use super::events::{DisconnectReason, ServerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connected,
    Joined { eid: u16 },
}

#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub tick: u32,
    pub peers: usize,
    pub joined: usize,
    pub entities: usize,
    pub bots: usize,
    pub snapshots_sent: u64,
    pub messages_dropped: u64,
}

#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub peer: PeerId,
    pub eid: Option<u16>,
    pub rtt_ms: Option<f32>,
}

/// Authoritative simulation driven by transport polls.
pub struct GameServer<T: Transport> {
    transport: T,
    config: ServerConfig,
    clock: TickClock,
    world: World,
    bots: BotPilot,
    peers: HashMap<PeerId, PeerState>,
    kicked: HashSet<PeerId>,
    tick: u32,
    stats: ServerStats,
    running: Arc<AtomicBool>,
    pending_events: VecDeque<ServerEvent>,
}

impl<T: Transport> GameServer<T> {
    pub fn new(transport: T, config: ServerConfig) -> Self {
        let clock = TickClock::new(config.tick_rate);
        let tick = clock.time_to_tick(transport.now_ms());
        let mut world = World::new();
        let mut bots = BotPilot::new();
        for _ in 0..config.bots {
            let Some(eid) = world.next_eid() else {
                break;
            };
            world.insert(spawn_entity(eid, tick));
            bots.add(eid);
        }
        if !bots.is_empty() {
            log::info!("Spawned {} bots", bots.len());
        }
        Self {
            transport,
            config,
            clock,
            world,
            bots,
            peers: HashMap::new(),
            kicked: HashSet::new(),
            tick,
            stats: ServerStats::default(),
            running: Arc::new(AtomicBool::new(true)),
            pending_events: VecDeque::new(),
        }
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn bots(&self) -> &BotPilot {
        &self.bots
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn peer_state(&self, peer: PeerId) -> Option<PeerState> {
        self.peers.get(&peer).copied()
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            tick: self.tick,
            peers: self.peers.len(),
            joined: self
                .peers
                .values()
                .filter(|s| matches!(s, PeerState::Joined { .. }))
                .count(),
            entities: self.world.entity_count(),
            bots: self.bots.len(),
            ..self.stats.clone()
        }
    }

    pub fn peer_infos(&self) -> Vec<PeerInfo> {
        let mut infos: Vec<PeerInfo> = self
            .peers
            .iter()
            .map(|(&peer, state)| PeerInfo {
                peer,
                eid: match state {
                    PeerState::Joined { eid } => Some(*eid),
                    PeerState::Connected => None,
                },
                rtt_ms: self.transport.rtt_ms(peer),
            })
            .collect();
        infos.sort_by_key(|i| i.peer);
        infos
    }

    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.tick_once() {
                log::error!("Server loop error: {e}");
                self.pending_events.push_back(ServerEvent::Error {
                    message: e.to_string(),
                });
            }
        }
        self.shutdown_connections();
    }

    pub fn shutdown_connections(&mut self) {
        let peers: Vec<PeerId> = self.peers.keys().copied().collect();
        for peer in peers {
            self.kick_peer(peer);
        }
    }

    /// Drops the peer; its entity is handled like any other disconnect on the next poll.
    pub fn kick_peer(&mut self, peer: PeerId) {
        if self.peers.contains_key(&peer) {
            self.kicked.insert(peer);
            self.transport.disconnect(peer);
        }
    }

    /// One loop iteration: drain the transport, steer bots, catch entities up
    /// to the current tick and publish snapshots for those that moved.
    pub fn tick_once(&mut self) -> Result<(), TransportError> {
        for event in self.transport.poll(self.config.poll_timeout)? {
            self.handle_event(event);
        }

        self.tick = self.current_tick();
        let dt = self.clock.dt();

        let mut advanced = Vec::new();
        for entity in self.world.entities_mut() {
            if entity.tick < self.tick {
                self.bots.steer(entity);
            }
            if catch_up(entity, self.tick, dt) > 0 {
                advanced.push((entity.eid, entity.snapshot()));
            }
        }

        for (eid, snapshot) in advanced {
            self.broadcast(&Message::Snapshot { eid, snapshot });
            self.stats.snapshots_sent += self.peers.len() as u64;
        }
        Ok(())
    }

    fn current_tick(&self) -> u32 {
        self.clock.time_to_tick(self.transport.now_ms())
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { peer } => {
                log::info!("Peer {peer} connected");
                self.peers.insert(peer, PeerState::Connected);
                self.pending_events
                    .push_back(ServerEvent::PeerConnected { peer });
            }
            TransportEvent::Received { peer, data, .. } => match Message::decode(&data) {
                Ok(message) => self.handle_message(peer, message),
                Err(e) => {
                    log::warn!("Dropping message from peer {peer}: {e}");
                    self.stats.messages_dropped += 1;
                }
            },
            TransportEvent::Disconnected { peer } => self.handle_disconnect(peer),
        }
    }

    fn handle_message(&mut self, peer: PeerId, message: Message) {
        match message {
            Message::Join => self.handle_join(peer),
            Message::Input { eid, thr, steer } => match self.world.get_mut(eid) {
                Some(entity) => entity.set_controls(thr, steer),
                None => log::trace!("Input for unknown entity {eid} from peer {peer}"),
            },
            other => {
                log::warn!("Unexpected {:?} message from peer {peer}", other.kind());
                self.stats.messages_dropped += 1;
            }
        }
    }

    fn handle_join(&mut self, peer: PeerId) {
        match self.peers.get(&peer) {
            Some(PeerState::Connected) => {}
            Some(&PeerState::Joined { eid }) => {
                log::warn!("Peer {peer} sent a second join, already controls entity {eid}");
                self.pending_events
                    .push_back(ServerEvent::DuplicateJoin { peer, eid });
                return;
            }
            None => {
                log::warn!("Join from unknown peer {peer}");
                return;
            }
        }

        let existing: Vec<Message> = self
            .world
            .entities()
            .map(|e| Message::NewEntity(e.clone()))
            .collect();
        for message in &existing {
            self.send(peer, message);
        }

        let Some(eid) = self.world.next_eid() else {
            log::warn!("No entity id left for peer {peer}");
            return;
        };
        let entity = spawn_entity(eid, self.current_tick());
        self.world.insert(entity.clone());

        self.broadcast(&Message::NewEntity(entity));
        self.send(peer, &Message::SetControlledEntity { eid });
        self.peers.insert(peer, PeerState::Joined { eid });

        log::info!("Peer {peer} joined as entity {eid}");
        self.pending_events
            .push_back(ServerEvent::PeerJoined { peer, eid });
    }

    fn handle_disconnect(&mut self, peer: PeerId) {
        let reason = if self.kicked.remove(&peer) {
            DisconnectReason::Kicked
        } else {
            DisconnectReason::Left
        };
        let Some(state) = self.peers.remove(&peer) else {
            return;
        };

        let eid = match state {
            PeerState::Joined { eid } => Some(eid),
            PeerState::Connected => None,
        };
        if let Some(eid) = eid {
            if self.config.retain_disconnected_entities {
                if let Some(entity) = self.world.get_mut(eid) {
                    entity.clear_controls();
                }
            } else if self.world.remove(eid).is_some() {
                self.broadcast(&Message::RemoveEntity { eid });
            }
        }

        log::info!("Peer {peer} {}", reason.as_str());
        self.pending_events
            .push_back(ServerEvent::PeerDisconnected { peer, eid, reason });
    }

    fn send(&mut self, peer: PeerId, message: &Message) {
        let data = message.encode();
        if let Err(e) = self.transport.send(peer, message.channel(), &data) {
            log::warn!("Failed to send {:?} to peer {peer}: {e}", message.kind());
        }
    }

    fn broadcast(&mut self, message: &Message) {
        let data = message.encode();
        let channel = message.channel();
        for &peer in self.peers.keys() {
            if let Err(e) = self.transport.send(peer, channel, &data) {
                log::warn!("Failed to send {:?} to peer {peer}: {e}", message.kind());
            }
        }
    }
}

fn spawn_entity(eid: u16, tick: u32) -> Entity {
    const MARGIN: f32 = 1.0;
    let pos = Vec2::new(
        rand_range(WORLD_BOUNDS_X.lo + MARGIN, WORLD_BOUNDS_X.hi - MARGIN),
        rand_range(WORLD_BOUNDS_Y.lo + MARGIN, WORLD_BOUNDS_Y.hi - MARGIN),
    );
    let ori = wrap_angle(rand_range(-std::f32::consts::PI, std::f32::consts::PI));
    let [r, g, b, ..] = rand_u64().to_le_bytes();
    Entity::spawned(eid, tick, pos, ori, Color::rgb(r, g, b))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::net::{Channel, LoopbackNetwork, LoopbackTransport, MessageKind};
    use crate::snapshot::{EntitySnapshot, INVALID_ENTITY};

    struct Harness {
        net: LoopbackNetwork,
        server: GameServer<LoopbackTransport>,
    }

    impl Harness {
        fn new(config: ServerConfig) -> Self {
            let net = LoopbackNetwork::new();
            let server = GameServer::new(net.endpoint(), config);
            Self { net, server }
        }

        fn client(&mut self) -> (LoopbackTransport, PeerId) {
            let mut client = self.net.endpoint();
            let server_addr = self.server.transport().addr();
            let peer = client.connect(server_addr).unwrap();
            client.poll(Duration::ZERO).unwrap();
            (client, peer)
        }
    }

    fn received(client: &mut LoopbackTransport) -> Vec<Message> {
        client
            .poll(Duration::ZERO)
            .unwrap()
            .into_iter()
            .filter_map(|e| match e {
                TransportEvent::Received { data, .. } => Some(Message::decode(&data).unwrap()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn join_spawns_inside_bounds() {
        let mut h = Harness::new(ServerConfig::default());
        h.net.advance(160);
        let (mut client, peer) = h.client();
        client.send(peer, Channel::Reliable, &Message::Join.encode()).unwrap();
        h.server.tick_once().unwrap();

        let messages = received(&mut client);
        let kinds: Vec<MessageKind> = messages.iter().map(Message::kind).collect();
        assert_eq!(kinds, vec![MessageKind::NewEntity, MessageKind::SetControlledEntity]);

        let Message::NewEntity(entity) = &messages[0] else {
            unreachable!()
        };
        assert_eq!(entity.eid, 0);
        assert_eq!(entity.tick, 10);
        assert!(entity.pos.x >= WORLD_BOUNDS_X.lo && entity.pos.x <= WORLD_BOUNDS_X.hi);
        assert!(entity.pos.y >= WORLD_BOUNDS_Y.lo && entity.pos.y <= WORLD_BOUNDS_Y.hi);
        assert_eq!(messages[1], Message::SetControlledEntity { eid: 0 });
    }

    fn join(h: &mut Harness) -> LoopbackTransport {
        let (mut client, peer) = h.client();
        client.send(peer, Channel::Reliable, &Message::Join.encode()).unwrap();
        h.server.tick_once().unwrap();
        client
    }

    fn summary(messages: &[Message]) -> Vec<(MessageKind, u16)> {
        messages
            .iter()
            .map(|m| {
                let eid = match m {
                    Message::NewEntity(entity) => entity.eid,
                    Message::SetControlledEntity { eid }
                    | Message::Snapshot { eid, .. }
                    | Message::RemoveEntity { eid }
                    | Message::Input { eid, .. } => *eid,
                    Message::Join => INVALID_ENTITY,
                };
                (m.kind(), eid)
            })
            .collect()
    }

    #[test]
    fn second_joiner_learns_existing_entities_before_its_own() {
        let mut h = Harness::new(ServerConfig::default());
        let mut a = join(&mut h);
        received(&mut a);

        let mut b = join(&mut h);
        assert_eq!(
            summary(&received(&mut b)),
            vec![
                (MessageKind::NewEntity, 0),
                (MessageKind::NewEntity, 1),
                (MessageKind::SetControlledEntity, 1),
            ]
        );
        assert_eq!(summary(&received(&mut a)), vec![(MessageKind::NewEntity, 1)]);
    }

    #[test]
    fn bots_are_announced_before_control() {
        let mut h = Harness::new(ServerConfig {
            bots: 3,
            ..ServerConfig::default()
        });
        assert_eq!(h.server.world().entity_count(), 3);
        assert_eq!(h.server.stats().bots, 3);

        let mut client = join(&mut h);
        assert_eq!(
            summary(&received(&mut client)),
            vec![
                (MessageKind::NewEntity, 0),
                (MessageKind::NewEntity, 1),
                (MessageKind::NewEntity, 2),
                (MessageKind::NewEntity, 3),
                (MessageKind::SetControlledEntity, 3),
            ]
        );
        assert!(h.server.bots().is_bot(2));
        assert!(!h.server.bots().is_bot(3));
    }

    fn snapshots_after(
        h: &mut Harness,
        client: &mut LoopbackTransport,
        ticks: u64,
    ) -> HashMap<u16, EntitySnapshot> {
        h.net.advance(ticks * h.server.clock().tick_ms());
        h.server.tick_once().unwrap();
        received(client)
            .into_iter()
            .filter_map(|m| match m {
                Message::Snapshot { eid, snapshot } => Some((eid, snapshot)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn bots_move_between_snapshots() {
        let mut h = Harness::new(ServerConfig {
            bots: 2,
            ..ServerConfig::default()
        });
        let mut client = join(&mut h);
        received(&mut client);

        let first = snapshots_after(&mut h, &mut client, 10);
        let second = snapshots_after(&mut h, &mut client, 10);

        for eid in 0..2 {
            let (a, b) = (first[&eid], second[&eid]);
            assert_eq!(b.tick, a.tick + 10);
            assert!(a.pos.distance(b.pos) > 0.05, "bot {eid} stood still");
            let bot = h.server.world().get(eid).unwrap();
            assert!(bot.thr > 0.0);
        }
        // The player entity is not driven.
        assert_eq!(second[&2].pos, first[&2].pos);
    }

    #[test]
    fn duplicate_join_is_ignored() {
        let mut h = Harness::new(ServerConfig::default());
        let (mut client, peer) = h.client();
        client.send(peer, Channel::Reliable, &Message::Join.encode()).unwrap();
        client.send(peer, Channel::Reliable, &Message::Join.encode()).unwrap();
        h.server.tick_once().unwrap();

        assert_eq!(h.server.world().entity_count(), 1);
        assert_eq!(received(&mut client).len(), 2);
        assert!(
            h.server
                .drain_events()
                .any(|e| matches!(e, ServerEvent::DuplicateJoin { eid: 0, .. }))
        );
    }

    #[test]
    fn snapshots_only_for_advanced_entities() {
        let mut h = Harness::new(ServerConfig::default());
        let (mut client, peer) = h.client();
        client.send(peer, Channel::Reliable, &Message::Join.encode()).unwrap();
        h.server.tick_once().unwrap();
        received(&mut client);

        // Same tick: nothing to publish.
        h.server.tick_once().unwrap();
        assert!(received(&mut client).is_empty());

        h.net.advance(3 * h.server.clock().tick_ms());
        h.server.tick_once().unwrap();
        let messages = received(&mut client);
        assert_eq!(messages.len(), 1);
        let Message::Snapshot { eid, snapshot } = messages[0] else {
            panic!("expected snapshot, got {:?}", messages[0]);
        };
        assert_eq!(eid, 0);
        assert_eq!(snapshot.tick, 3);
        assert_eq!(h.server.world().get(0).unwrap().tick, 3);
    }

    #[test]
    fn input_updates_controls() {
        let mut h = Harness::new(ServerConfig::default());
        let (mut client, peer) = h.client();
        client.send(peer, Channel::Reliable, &Message::Join.encode()).unwrap();
        h.server.tick_once().unwrap();

        let input = Message::Input {
            eid: 0,
            thr: 1.0,
            steer: -1.0,
        };
        client.send(peer, Channel::Unreliable, &input.encode()).unwrap();
        let unknown = Message::Input {
            eid: 9,
            thr: 1.0,
            steer: 1.0,
        };
        client.send(peer, Channel::Unreliable, &unknown.encode()).unwrap();
        client.send(peer, Channel::Unreliable, &[200]).unwrap();
        h.server.tick_once().unwrap();

        let entity = h.server.world().get(0).unwrap();
        assert_eq!((entity.thr, entity.steer), (1.0, -1.0));
        assert_eq!(h.server.world().entity_count(), 1);
        assert_eq!(h.server.stats().messages_dropped, 1);
    }

    #[test]
    fn disconnect_removes_entity() {
        let mut h = Harness::new(ServerConfig::default());
        let (mut a, peer_a) = h.client();
        let (mut b, peer_b) = h.client();
        a.send(peer_a, Channel::Reliable, &Message::Join.encode()).unwrap();
        b.send(peer_b, Channel::Reliable, &Message::Join.encode()).unwrap();
        h.server.tick_once().unwrap();
        received(&mut b);

        a.disconnect(peer_a);
        h.server.tick_once().unwrap();

        assert_eq!(h.server.world().entity_count(), 1);
        assert_eq!(received(&mut b), vec![Message::RemoveEntity { eid: 0 }]);
    }

    #[test]
    fn retained_entity_keeps_neutral_controls() {
        let mut h = Harness::new(ServerConfig {
            retain_disconnected_entities: true,
            ..ServerConfig::default()
        });
        let (mut a, peer) = h.client();
        a.send(peer, Channel::Reliable, &Message::Join.encode()).unwrap();
        a.send(
            peer,
            Channel::Unreliable,
            &Message::Input {
                eid: 0,
                thr: 1.0,
                steer: 1.0,
            }
            .encode(),
        )
        .unwrap();
        h.server.tick_once().unwrap();

        a.disconnect(peer);
        h.server.tick_once().unwrap();

        let entity = h.server.world().get(0).unwrap();
        assert_eq!((entity.thr, entity.steer), (0.0, 0.0));
        assert_eq!(h.server.stats().peers, 0);
    }

    #[test]
    fn kick_reports_reason() {
        let mut h = Harness::new(ServerConfig::default());
        let (_client, _) = h.client();
        h.server.tick_once().unwrap();
        let peer = h.server.peer_infos()[0].peer;

        h.server.kick_peer(peer);
        h.server.tick_once().unwrap();
        assert!(h.server.drain_events().any(|e| matches!(
            e,
            ServerEvent::PeerDisconnected {
                reason: DisconnectReason::Kicked,
                ..
            }
        )));
        assert!(h.server.peer_state(peer).is_none());
    }
}
