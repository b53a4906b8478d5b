use realm_common::{EntityId, EntityKind};
use realm_entity::Entity;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
struct Slot {
    seq: u64,
    entity: Entity,
}

/// Authoritative map from id to live entity.
///
/// Lookup and removal are O(1) on the id map; predicate queries scan every
/// loaded entity in insertion order. Absent keys yield `None`, never an error.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<EntityId, Slot>,
    order: BTreeMap<u64, EntityId>,
    next_seq: u64,
    type_counts: BTreeMap<EntityKind, usize>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by id. A replaced entity keeps its scan position and
    /// is returned.
    pub fn add(&mut self, entity: Entity) -> Option<Entity> {
        let id = entity.id();
        *self.type_counts.entry(entity.kind()).or_insert(0) += 1;
        match self.entities.get_mut(&id) {
            Some(slot) => {
                let old = std::mem::replace(&mut slot.entity, entity);
                self.decrement(old.kind());
                Some(old)
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.order.insert(seq, id);
                self.entities.insert(id, Slot { seq, entity });
                tracing::trace!(id = %id.short(), "registered");
                None
            }
        }
    }

    pub fn lookup(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id).map(|slot| &slot.entity)
    }

    pub fn lookup_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id).map(|slot| &mut slot.entity)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Detach an entity by id (or by a reference to it).
    pub fn remove(&mut self, target: impl Into<EntityId>) -> Option<Entity> {
        let id = target.into();
        let slot = self.entities.remove(&id)?;
        self.order.remove(&slot.seq);
        self.decrement(slot.entity.kind());
        tracing::trace!(id = %id.short(), "unregistered");
        Some(slot.entity)
    }

    /// Every entity matching `predicate`, in insertion order.
    pub fn find_all(&self, mut predicate: impl FnMut(&Entity) -> bool) -> Vec<&Entity> {
        self.iter().filter(|e| predicate(e)).collect()
    }

    pub fn of_kind(&self, kind: EntityKind) -> Vec<&Entity> {
        self.find_all(|e| e.kind() == kind)
    }

    /// Live player whose name matches case-insensitively.
    pub fn find_player(&self, name: &str) -> Option<&Entity> {
        let wanted = name.to_lowercase();
        self.iter()
            .find(|e| e.is_player() && e.name.to_lowercase() == wanted)
    }

    /// Entities in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.order
            .values()
            .filter_map(|id| self.entities.get(id).map(|slot| &slot.entity))
    }

    /// Snapshot of live ids in insertion order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.order.values().copied().collect()
    }

    pub fn count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn type_counts(&self) -> &BTreeMap<EntityKind, usize> {
        &self.type_counts
    }

    pub fn count_of(&self, kind: EntityKind) -> usize {
        self.type_counts.get(&kind).copied().unwrap_or(0)
    }

    fn decrement(&mut self, kind: EntityKind) {
        if let Some(n) = self.type_counts.get_mut(&kind) {
            *n -= 1;
            if *n == 0 {
                self.type_counts.remove(&kind);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_entity::Blueprint;

    fn entity(kind: EntityKind, name: &str) -> Entity {
        Entity::new(EntityId::new(), kind, None, Blueprint::named(name))
    }

    #[test]
    fn registry_starts_empty() {
        let r = EntityRegistry::new();
        assert_eq!(r.count(), 0);
        assert!(r.type_counts().is_empty());
    }

    #[test]
    fn add_lookup_remove() {
        let mut r = EntityRegistry::new();
        let e = entity(EntityKind::Item, "Key");
        let id = e.id();
        assert!(r.add(e).is_none());
        assert_eq!(r.lookup(id).unwrap().name, "Key");
        assert_eq!(r.count_of(EntityKind::Item), 1);

        let removed = r.remove(id).unwrap();
        assert_eq!(removed.id(), id);
        assert!(r.lookup(id).is_none());
        assert_eq!(r.count_of(EntityKind::Item), 0);
        assert!(r.remove(id).is_none());
    }

    #[test]
    fn add_is_idempotent_and_keeps_counts() {
        let mut r = EntityRegistry::new();
        let e = entity(EntityKind::Room, "Hall");
        let id = e.id();
        r.add(e.clone());
        let replaced = r.add(e);
        assert!(replaced.is_some());
        assert_eq!(r.count(), 1);
        assert_eq!(r.count_of(EntityKind::Room), 1);
        assert_eq!(r.ids(), vec![id]);
    }

    #[test]
    fn remove_accepts_entity_reference() {
        let mut r = EntityRegistry::new();
        let e = entity(EntityKind::Item, "Coin");
        let copy = e.clone();
        r.add(e);
        assert!(r.remove(&copy).is_some());
        assert!(r.is_empty());
    }

    #[test]
    fn find_all_scans_in_insertion_order() {
        let mut r = EntityRegistry::new();
        let names = ["c", "a", "b", "d"];
        for n in names {
            r.add(entity(EntityKind::Item, n));
        }
        r.add(entity(EntityKind::Room, "room"));
        let found: Vec<&str> = r
            .find_all(|e| e.kind() == EntityKind::Item)
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(found, names);
        assert_eq!(r.of_kind(EntityKind::Room).len(), 1);
    }

    #[test]
    fn type_counts_track_kinds() {
        let mut r = EntityRegistry::new();
        r.add(entity(EntityKind::Item, "a"));
        r.add(entity(EntityKind::Item, "b"));
        let p = entity(EntityKind::Player, "Ann");
        let pid = p.id();
        r.add(p);
        assert_eq!(r.type_counts().get(&EntityKind::Item), Some(&2));
        assert_eq!(r.type_counts().get(&EntityKind::Player), Some(&1));
        r.remove(pid);
        assert!(!r.type_counts().contains_key(&EntityKind::Player));
    }

    #[test]
    fn find_player_ignores_case() {
        let mut r = EntityRegistry::new();
        r.add(entity(EntityKind::Player, "Ann"));
        r.add(entity(EntityKind::Creature, "ann"));
        let found = r.find_player("ANN").unwrap();
        assert!(found.is_player());
    }

    #[test]
    fn find_player_folds_non_ascii_case() {
        let mut r = EntityRegistry::new();
        r.add(entity(EntityKind::Player, "Öskar"));
        assert!(r.find_player("öSKAR").is_some());
        assert!(r.find_player("Oskar").is_none());
    }
}
