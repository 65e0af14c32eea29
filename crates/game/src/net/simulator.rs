use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::stats::PacketLossSimulation;

#[derive(Debug)]
struct DelayedDatagram {
    release_time: Instant,
    order: u64,
    data: Vec<u8>,
    addr: SocketAddr,
}

impl PartialEq for DelayedDatagram {
    fn eq(&self, other: &Self) -> bool {
        self.release_time == other.release_time && self.order == other.order
    }
}

impl Eq for DelayedDatagram {}

impl PartialOrd for DelayedDatagram {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedDatagram {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .release_time
            .cmp(&self.release_time)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Drops and delays outbound datagrams according to a `PacketLossSimulation`.
#[derive(Debug, Default)]
pub struct NetworkSimulator {
    global: Option<PacketLossSimulation>,
    configs: HashMap<SocketAddr, PacketLossSimulation>,
    outbound_queue: BinaryHeap<DelayedDatagram>,
    next_order: u64,
}

impl NetworkSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_global(&mut self, config: Option<PacketLossSimulation>) {
        self.global = config.filter(|c| c.enabled);
    }

    pub fn set_config(&mut self, addr: SocketAddr, config: PacketLossSimulation) {
        if config.enabled {
            self.configs.insert(addr, config);
        } else {
            self.configs.remove(&addr);
        }
    }

    pub fn config_for(&self, addr: &SocketAddr) -> Option<&PacketLossSimulation> {
        self.configs.get(addr).or(self.global.as_ref())
    }

    pub fn is_active(&self) -> bool {
        self.global.is_some() || !self.configs.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.outbound_queue.len()
    }

    /// Returns false when the datagram was dropped.
    pub fn enqueue_outbound(&mut self, data: Vec<u8>, addr: SocketAddr) -> bool {
        let delay = match self.config_for(&addr) {
            Some(sim) if sim.should_drop() => return false,
            Some(sim) => Duration::from_millis(u64::from(sim.delay_ms())),
            None => Duration::ZERO,
        };
        let order = self.next_order;
        self.next_order += 1;
        self.outbound_queue.push(DelayedDatagram {
            release_time: Instant::now() + delay,
            order,
            data,
            addr,
        });
        true
    }

    pub fn take_outbound(&mut self) -> Vec<(Vec<u8>, SocketAddr)> {
        let mut datagrams = Vec::new();
        let now = Instant::now();
        while self
            .outbound_queue
            .peek()
            .is_some_and(|d| d.release_time <= now)
        {
            if let Some(delayed) = self.outbound_queue.pop() {
                datagrams.push((delayed.data, delayed.addr));
            }
        }
        datagrams
    }

    pub fn next_release(&self) -> Option<Instant> {
        self.outbound_queue.peek().map(|d| d.release_time)
    }
}
