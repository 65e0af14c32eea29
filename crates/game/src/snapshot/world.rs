use std::collections::HashMap;

use super::entity::{Entity, INVALID_ENTITY};

/// Dense entity storage with an eid index.
#[derive(Debug, Default)]
pub struct World {
    entities: Vec<Entity>,
    index: HashMap<u16, usize>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false and leaves the world untouched if the eid is already live.
    pub fn insert(&mut self, entity: Entity) -> bool {
        if entity.eid == INVALID_ENTITY || self.index.contains_key(&entity.eid) {
            return false;
        }
        self.index.insert(entity.eid, self.entities.len());
        self.entities.push(entity);
        true
    }

    pub fn remove(&mut self, eid: u16) -> Option<Entity> {
        let slot = self.index.remove(&eid)?;
        let entity = self.entities.swap_remove(slot);
        if let Some(moved) = self.entities.get(slot) {
            self.index.insert(moved.eid, slot);
        }
        Some(entity)
    }

    pub fn get(&self, eid: u16) -> Option<&Entity> {
        self.index.get(&eid).map(|&slot| &self.entities[slot])
    }

    pub fn get_mut(&mut self, eid: u16) -> Option<&mut Entity> {
        self.index.get(&eid).map(|&slot| &mut self.entities[slot])
    }

    pub fn contains(&self, eid: u16) -> bool {
        self.index.contains_key(&eid)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.iter_mut()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// One past the largest live eid, 0 for an empty world.
    pub fn next_eid(&self) -> Option<u16> {
        match self.entities.iter().map(|e| e.eid).max() {
            None => Some(0),
            Some(max) => max.checked_add(1).filter(|&eid| eid != INVALID_ENTITY),
        }
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eid_allocation() {
        let mut world = World::new();
        assert_eq!(world.next_eid(), Some(0));

        world.insert(Entity::new(0, 0));
        world.insert(Entity::new(7, 0));
        assert_eq!(world.next_eid(), Some(8));

        world.remove(7);
        assert_eq!(world.next_eid(), Some(1));

        world.insert(Entity::new(INVALID_ENTITY - 1, 0));
        assert_eq!(world.next_eid(), None);
    }

    #[test]
    fn duplicate_insert_rejected() {
        let mut world = World::new();
        let mut first = Entity::new(4, 0);
        first.speed = 1.0;
        assert!(world.insert(first));
        assert!(!world.insert(Entity::new(4, 9)));
        assert_eq!(world.get(4).map(|e| e.speed), Some(1.0));
        assert!(!world.insert(Entity::new(INVALID_ENTITY, 0)));
    }

    #[test]
    fn remove_keeps_index_consistent() {
        let mut world = World::new();
        for eid in 0..4 {
            world.insert(Entity::new(eid, 0));
        }

        assert_eq!(world.remove(1).map(|e| e.eid), Some(1));
        assert!(world.remove(1).is_none());
        assert_eq!(world.entity_count(), 3);
        for eid in [0, 2, 3] {
            assert_eq!(world.get(eid).map(|e| e.eid), Some(eid));
        }

        world.get_mut(3).unwrap().thr = 0.5;
        assert_eq!(world.get(3).unwrap().thr, 0.5);
    }
}
