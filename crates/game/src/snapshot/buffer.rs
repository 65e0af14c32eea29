use super::entity::{EntityInput, EntitySnapshot};

pub trait Ticked {
    fn tick(&self) -> u32;
}

impl Ticked for EntitySnapshot {
    fn tick(&self) -> u32 {
        self.tick
    }
}

impl Ticked for EntityInput {
    fn tick(&self) -> u32 {
        self.tick
    }
}

/// Fixed-capacity ring keyed by tick. Older ticks are overwritten once the
/// window wraps.
#[derive(Debug, Clone)]
pub struct SnapshotBuffer<T> {
    slots: Vec<Option<T>>,
    capacity: usize,
}

impl<T: Ticked> SnapshotBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&mut self, item: T) {
        let index = (item.tick() as usize) % self.capacity;
        self.slots[index] = Some(item);
    }

    pub fn get(&self, tick: u32) -> Option<&T> {
        let index = (tick as usize) % self.capacity;
        self.slots[index].as_ref().filter(|s| s.tick() == tick)
    }

    pub fn latest(&self) -> Option<&T> {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref())
            .max_by_key(|s| s.tick())
    }

    /// Drops every entry older than `tick`.
    pub fn prune_before(&mut self, tick: u32) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|s| s.tick() < tick) {
                *slot = None;
            }
        }
    }

    /// Entries with a tick strictly greater than `tick`, ascending.
    pub fn after(&self, tick: u32) -> Vec<&T> {
        let mut out: Vec<&T> = self
            .slots
            .iter()
            .filter_map(|s| s.as_ref())
            .filter(|s| s.tick() > tick)
            .collect();
        out.sort_by_key(|s| s.tick());
        out
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(tick: u32) -> EntityInput {
        EntityInput {
            tick,
            thr: 1.0,
            steer: 0.0,
        }
    }

    #[test]
    fn o1_lookup() {
        let mut buffer = SnapshotBuffer::new(64);
        for tick in 0..100 {
            buffer.push(input(tick));
        }

        assert_eq!(buffer.get(50).map(|i| i.tick), Some(50));
        assert!(buffer.get(30).is_none());
        assert_eq!(buffer.len(), 64);
        assert_eq!(buffer.latest().map(|i| i.tick), Some(99));
    }

    #[test]
    fn prune_and_replay_order() {
        let mut buffer = SnapshotBuffer::new(16);
        for tick in [5, 3, 9, 7, 4] {
            buffer.push(input(tick));
        }

        buffer.prune_before(4);
        assert!(buffer.get(3).is_none());
        assert_eq!(buffer.len(), 4);

        let ticks: Vec<u32> = buffer.after(4).iter().map(|i| i.tick).collect();
        assert_eq!(ticks, vec![5, 7, 9]);
    }
}
