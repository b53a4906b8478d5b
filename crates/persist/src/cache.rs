//! Demand-loading registry with an idle eviction sweep.

use crate::error::StoreError;
use crate::store::PersistentStore;
use realm_common::EntityId;
use realm_entity::Entity;
use realm_kernel::EntityRegistry;
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Outcome of one [`CachingEntityRegistry::evict_idle`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionSummary {
    pub evicted: usize,
    pub failed: usize,
}

/// An [`EntityRegistry`] that falls through to the store on a miss.
///
/// Everything the plain registry offers is reachable through `Deref`; the
/// methods defined here shadow `lookup`/`lookup_mut` with fallible versions.
/// Eviction needs `&mut self`, so it can never interleave with a lookup.
#[derive(Debug)]
pub struct CachingEntityRegistry {
    registry: EntityRegistry,
    store: Arc<PersistentStore>,
}

impl CachingEntityRegistry {
    pub fn new(store: Arc<PersistentStore>) -> Self {
        Self {
            registry: EntityRegistry::new(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<PersistentStore> {
        &self.store
    }

    /// Live instance for `id`, loading it (and its graph) on a miss. An id the
    /// store has never seen is `None`; broken records are errors.
    pub fn lookup(&mut self, id: EntityId) -> Result<Option<&Entity>, StoreError> {
        self.ensure_loaded(id)?;
        Ok(self.registry.lookup(id))
    }

    pub fn lookup_mut(&mut self, id: EntityId) -> Result<Option<&mut Entity>, StoreError> {
        self.ensure_loaded(id)?;
        Ok(self.registry.lookup_mut(id))
    }

    /// Registry-only lookup that never touches the store.
    pub fn peek(&self, id: EntityId) -> Option<&Entity> {
        self.registry.lookup(id)
    }

    pub fn peek_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.registry.lookup_mut(id)
    }

    fn ensure_loaded(&mut self, id: EntityId) -> Result<(), StoreError> {
        if self.registry.contains(id) {
            return Ok(());
        }
        match self.store.load(id, &mut self.registry) {
            Ok(_) => {
                tracing::debug!(id = %id.short(), "loaded on miss");
                Ok(())
            }
            Err(StoreError::NoSuchEntity(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Store and unload every idle entity. Runs passes until nothing more is
    /// eligible, so a whole idle subtree goes once its root has left.
    pub fn evict_idle(&mut self) -> EvictionSummary {
        let _span = tracing::debug_span!("evict_idle").entered();
        let mut summary = EvictionSummary::default();
        let mut failed = HashSet::new();

        loop {
            let candidates: Vec<EntityId> = self
                .registry
                .iter()
                .filter(|e| !failed.contains(&e.id()) && self.is_evictable(e))
                .map(Entity::id)
                .collect();
            if candidates.is_empty() {
                break;
            }

            for id in candidates {
                if let Err(err) = self.store.store(id, &mut self.registry) {
                    tracing::warn!(id = %id, %err, "eviction store failed, keeping entity");
                    failed.insert(id);
                    summary.failed += 1;
                    continue;
                }
                self.registry.remove(id);
                summary.evicted += 1;
            }
        }

        if summary.evicted > 0 || summary.failed > 0 {
            tracing::info!(
                evicted = summary.evicted,
                failed = summary.failed,
                remaining = self.registry.count(),
                "eviction sweep"
            );
        }
        summary
    }

    fn is_evictable(&self, entity: &Entity) -> bool {
        if entity.is_busy() || entity.is_player() || entity.is_controlled() {
            return false;
        }
        if let Some(parent) = entity.container() {
            if self.registry.contains(parent) {
                return false;
            }
        }
        !self.holds_occupant(entity, &mut HashSet::new())
    }

    /// Whether a player or controlled creature is somewhere inside `entity`.
    fn holds_occupant(&self, entity: &Entity, seen: &mut HashSet<EntityId>) -> bool {
        if !seen.insert(entity.id()) {
            return false;
        }
        entity.contents().into_iter().any(|member| {
            self.registry.lookup(member).is_some_and(|child| {
                child.is_player()
                    || child.is_controlled()
                    || child.is_busy()
                    || self.holds_occupant(child, seen)
            })
        })
    }
}

impl Deref for CachingEntityRegistry {
    type Target = EntityRegistry;

    fn deref(&self) -> &EntityRegistry {
        &self.registry
    }
}

impl DerefMut for CachingEntityRegistry {
    fn deref_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }
}
