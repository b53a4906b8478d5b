//! The persistent entity store.
//!
//! Entities are routed by id to a per-kind partition. Containment is stored as
//! bare ids; loading an entity resolves its inventory and equipment members
//! recursively and pulls in its ancestor chain, so a grandchild resolves
//! whether or not its ancestors were already live.

use crate::backend::{Backend, FileBackend, MemoryBackend};
use crate::codec;
use crate::credentials::CredentialHash;
use crate::error::StoreError;
use realm_common::{EntityId, EntityKind};
use realm_entity::{Dehydrated, Entity, Persistable};
use realm_kernel::EntityRegistry;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// id -> kind.
pub const ROUTING_PARTITION: &str = "entities";
/// lowercase player name -> id.
pub const PLAYERS_PARTITION: &str = "players";
/// player id -> salted secret hash.
pub const CREDENTIALS_PARTITION: &str = "credentials";

/// Outcome of [`PersistentStore::save_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub saved: usize,
    pub failed: usize,
}

/// Outcome of [`PersistentStore::load_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub failed: usize,
    /// Member ids dropped because no loadable record exists for them.
    pub pruned: usize,
    /// Entities moved to the fallback location because their container vanished.
    pub relocated: usize,
}

struct StoreInner {
    backend: Box<dyn Backend>,
    saves: u64,
}

/// Durable, partitioned entity storage behind one coarse lock.
///
/// The lock makes the store safe to share with a background save timer; it
/// does not protect in-memory entity state.
pub struct PersistentStore {
    inner: Mutex<StoreInner>,
    fallback: Option<EntityId>,
}

impl std::fmt::Debug for PersistentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStore")
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl PersistentStore {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                backend: Box::new(backend),
                saves: 0,
            }),
            fallback: None,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Open or create a file-backed store directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::new(FileBackend::open(path)?))
    }

    /// Location that orphaned entities are moved into when their container
    /// cannot be resolved.
    pub fn with_fallback(mut self, fallback: EntityId) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn fallback(&self) -> Option<EntityId> {
        self.fallback
    }

    /// Number of entity records written since the store was opened.
    pub fn save_count(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.saves)
    }

    pub fn contains(&self, id: EntityId) -> Result<bool, StoreError> {
        Ok(self.lock()?.backend.get(ROUTING_PARTITION, &id.to_string())?.is_some())
    }

    pub fn kind_of(&self, id: EntityId) -> Result<Option<EntityKind>, StoreError> {
        self.lock()?.routing_kind(id)
    }

    /// Every routed entity, sorted by id.
    pub fn entities(&self) -> Result<Vec<(EntityId, EntityKind)>, StoreError> {
        self.lock()?.routing_table()
    }

    pub fn partition_len(&self, partition: &str) -> Result<usize, StoreError> {
        Ok(self.lock()?.backend.keys(partition)?.len())
    }

    // --- entity records ---

    /// Persist a registered entity, then every entity it has equipped.
    /// General inventory members are stored on their own schedule.
    pub fn store(&self, id: EntityId, registry: &mut EntityRegistry) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let mut visited = HashSet::new();
        inner.store_tree(id, registry, &mut visited)
    }

    /// Persist a single entity without touching anything it references.
    pub fn store_entity(&self, entity: &mut Entity) -> Result<(), StoreError> {
        self.lock()?.write_entity(entity)
    }

    /// Resolve `id`, loading it and everything it transitively references into
    /// `registry`. An already registered entity is returned as is.
    pub fn load<'r>(
        &self,
        id: EntityId,
        registry: &'r mut EntityRegistry,
    ) -> Result<&'r Entity, StoreError> {
        {
            let inner = self.lock()?;
            let _span = tracing::debug_span!("load", id = %id.short()).entered();
            inner.load_into(id, registry, self.fallback)?;
        }
        registry.lookup(id).ok_or(StoreError::NoSuchEntity(id))
    }

    /// Bulk load in two passes: decode every record first, then resolve
    /// cross-links, so forward references work regardless of scan order.
    pub fn load_all(
        &self,
        include_players: bool,
        registry: &mut EntityRegistry,
    ) -> Result<LoadSummary, StoreError> {
        let _span = tracing::info_span!("load_all", include_players).entered();
        let inner = self.lock()?;
        let routing: HashMap<EntityId, EntityKind> = inner.routing_table()?.into_iter().collect();
        let mut summary = LoadSummary::default();

        let mut ordered: Vec<(EntityId, EntityKind)> =
            routing.iter().map(|(id, kind)| (*id, *kind)).collect();
        ordered.sort();

        let mut loaded = Vec::new();
        let mut unloadable = HashSet::new();
        for (id, kind) in ordered {
            if kind == EntityKind::Player && !include_players {
                continue;
            }
            if registry.contains(id) {
                continue;
            }
            match inner.read_payload(id, kind) {
                Ok(entity) => {
                    registry.add(entity);
                    loaded.push(id);
                }
                Err(err) => {
                    tracing::warn!(id = %id, %err, "skipping unloadable entity");
                    unloadable.insert(id);
                    summary.failed += 1;
                }
            }
        }

        let resolvable =
            |id: &EntityId| routing.contains_key(id) && !unloadable.contains(id);
        for id in &loaded {
            let Some(entity) = registry.lookup(*id) else {
                continue;
            };
            let members = entity.contents();
            let container = entity.container();

            let mut dangling = Vec::new();
            let mut stale = Vec::new();
            for member in members {
                if registry.contains(member) {
                    if !claim_member(registry, *id, member) {
                        stale.push(member);
                    }
                } else if !resolvable(&member) {
                    dangling.push(member);
                }
            }
            if !dangling.is_empty() {
                tracing::warn!(id = %id, count = dangling.len(), "pruning dangling members");
                summary.pruned += dangling.len();
            }
            if !dangling.is_empty() || !stale.is_empty() {
                if let Some(entity) = registry.lookup_mut(*id) {
                    entity.prune_contents(|m| !dangling.contains(&m) && !stale.contains(&m));
                }
            }

            if let Some(parent) = container {
                if registry.contains(parent) {
                    if !relist_in(registry, parent, *id) {
                        inner.relocate_to_fallback(*id, registry, self.fallback);
                        summary.relocated += 1;
                    }
                } else if !resolvable(&parent) {
                    inner.relocate_to_fallback(*id, registry, self.fallback);
                    summary.relocated += 1;
                }
            }
        }

        summary.loaded = loaded.len();
        tracing::info!(
            loaded = summary.loaded,
            failed = summary.failed,
            pruned = summary.pruned,
            relocated = summary.relocated,
            "load_all complete"
        );
        Ok(summary)
    }

    /// Store every registered entity. Players go through the player path so
    /// the name index stays current. Individual failures are logged and counted.
    pub fn save_all(&self, registry: &mut EntityRegistry) -> SaveSummary {
        let _span = tracing::info_span!("save_all").entered();
        let ids = registry.ids();
        let mut summary = SaveSummary::default();
        let mut inner = match self.lock() {
            Ok(inner) => inner,
            Err(err) => {
                tracing::error!(%err, "save_all aborted");
                summary.failed = ids.len();
                return summary;
            }
        };

        for id in ids {
            let Some(entity) = registry.lookup_mut(id) else {
                continue;
            };
            let result = if entity.is_player() {
                inner.write_player(entity)
            } else {
                inner.write_entity(entity)
            };
            match result {
                Ok(()) => summary.saved += 1,
                Err(err) => {
                    tracing::warn!(id = %id, %err, "save failed");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(saved = summary.saved, failed = summary.failed, "save_all complete");
        summary
    }

    /// Remove an entity's record and routing entry. Returns the id if it was stored.
    pub fn delete(&self, target: impl Into<EntityId>) -> Result<Option<EntityId>, StoreError> {
        let id = target.into();
        self.lock()?.delete_record(id)
    }

    // --- players and credentials ---

    /// Store a player and refresh its name index entry.
    pub fn save_player(&self, player: &mut Entity) -> Result<(), StoreError> {
        self.lock()?.write_player(player)
    }

    pub fn player_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.player_id(name)?.is_some())
    }

    pub fn player_id(&self, name: &str) -> Result<Option<EntityId>, StoreError> {
        self.lock()?.player_id(name)
    }

    /// Compare `secret` against the stored hash. A player with no credential
    /// on record never authenticates.
    pub fn check_credential(&self, name: &str, secret: &str) -> Result<bool, StoreError> {
        let inner = self.lock()?;
        let id = inner
            .player_id(name)?
            .ok_or_else(|| StoreError::UnknownCharacter(name.to_string()))?;
        let Some(bytes) = inner.backend.get(CREDENTIALS_PARTITION, &id.to_string())? else {
            tracing::warn!(name, "player has no credential on record");
            return Ok(false);
        };
        let hash: CredentialHash = codec::cbor_deserialize(&bytes)?;
        Ok(hash.verify(secret))
    }

    /// Like [`check_credential`](Self::check_credential) but raises
    /// `BadCredential` on mismatch and yields the player's id on success.
    pub fn authenticate(&self, name: &str, secret: &str) -> Result<EntityId, StoreError> {
        if !self.check_credential(name, secret)? {
            return Err(StoreError::BadCredential(name.to_string()));
        }
        self.player_id(name)?
            .ok_or_else(|| StoreError::UnknownCharacter(name.to_string()))
    }

    pub fn set_credential(&self, id: EntityId, secret: &str) -> Result<(), StoreError> {
        let bytes = codec::cbor_serialize(&CredentialHash::new(secret))?;
        self.lock()?
            .backend
            .put(CREDENTIALS_PARTITION, &id.to_string(), &bytes)
    }

    /// Name-addressed form of [`set_credential`](Self::set_credential).
    pub fn set_credential_for(&self, name: &str, secret: &str) -> Result<(), StoreError> {
        let id = self
            .player_id(name)?
            .ok_or_else(|| StoreError::UnknownCharacter(name.to_string()))?;
        self.set_credential(id, secret)
    }

    /// Remove a player's record, name index entry and credential together.
    pub fn delete_player(&self, name: &str) -> Result<EntityId, StoreError> {
        let mut inner = self.lock()?;
        let id = inner
            .player_id(name)?
            .ok_or_else(|| StoreError::UnknownCharacter(name.to_string()))?;
        inner.delete_player_entries(id)?;
        tracing::info!(name, id = %id, "player deleted");
        Ok(id)
    }

    /// Id-addressed form of [`delete_player`](Self::delete_player). Every name
    /// index entry pointing at `id` goes, so a renamed player leaves nothing
    /// behind. Returns the id if a record was stored.
    pub fn delete_player_by_id(&self, id: EntityId) -> Result<Option<EntityId>, StoreError> {
        let deleted = self.lock()?.delete_player_entries(id)?;
        tracing::info!(id = %id, "player deleted");
        Ok(deleted)
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }

    #[cfg(test)]
    fn put_raw(&self, partition: &str, key: &str, bytes: &[u8]) {
        self.lock().unwrap().backend.put(partition, key, bytes).unwrap();
    }
}

impl StoreInner {
    fn routing_kind(&self, id: EntityId) -> Result<Option<EntityKind>, StoreError> {
        let Some(bytes) = self.backend.get(ROUTING_PARTITION, &id.to_string())? else {
            return Ok(None);
        };
        let kind = std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse::<EntityKind>().ok())
            .ok_or_else(|| StoreError::load(id, "unreadable routing entry"))?;
        Ok(Some(kind))
    }

    fn routing_table(&self) -> Result<Vec<(EntityId, EntityKind)>, StoreError> {
        let mut table = Vec::new();
        for key in self.backend.keys(ROUTING_PARTITION)? {
            let Ok(id) = key.parse::<EntityId>() else {
                tracing::warn!(key, "skipping routing key that is not an id");
                continue;
            };
            match self.routing_kind(id) {
                Ok(Some(kind)) => table.push((id, kind)),
                Ok(None) => {}
                Err(err) => tracing::warn!(%err, "skipping routing entry"),
            }
        }
        table.sort();
        Ok(table)
    }

    fn player_id(&self, name: &str) -> Result<Option<EntityId>, StoreError> {
        let key = name.to_lowercase();
        let Some(bytes) = self.backend.get(PLAYERS_PARTITION, &key)? else {
            return Ok(None);
        };
        std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse::<EntityId>().ok())
            .map(Some)
            .ok_or(StoreError::CorruptIndex {
                partition: PLAYERS_PARTITION.to_string(),
                key,
            })
    }

    fn write_entity(&mut self, entity: &mut Entity) -> Result<(), StoreError> {
        let guard = Dehydrated::new(entity);
        let key = guard.id().to_string();
        let kind = guard.kind();
        let payload = codec::encode_entity(&guard)?;
        self.backend
            .put(ROUTING_PARTITION, &key, kind.partition().as_bytes())?;
        self.backend.put(kind.partition(), &key, &payload)?;
        self.saves += 1;
        tracing::trace!(id = %guard.id().short(), %kind, bytes = payload.len(), "stored");
        Ok(())
    }

    fn write_player(&mut self, player: &mut Entity) -> Result<(), StoreError> {
        self.write_entity(player)?;
        self.backend.put(
            PLAYERS_PARTITION,
            &player.name.to_lowercase(),
            player.id().to_string().as_bytes(),
        )
    }

    fn store_tree(
        &mut self,
        id: EntityId,
        registry: &mut EntityRegistry,
        visited: &mut HashSet<EntityId>,
    ) -> Result<(), StoreError> {
        if !visited.insert(id) {
            return Ok(());
        }
        let entity = registry
            .lookup_mut(id)
            .ok_or(StoreError::NoSuchEntity(id))?;
        let equipped = entity.equipped();
        self.write_entity(entity)?;
        for item in equipped {
            if registry.contains(item) {
                self.store_tree(item, registry, visited)?;
            }
        }
        Ok(())
    }

    fn delete_record(&mut self, id: EntityId) -> Result<Option<EntityId>, StoreError> {
        let key = id.to_string();
        match self.routing_kind(id) {
            Ok(None) => return Ok(None),
            Ok(Some(kind)) => {
                self.backend.remove(kind.partition(), &key)?;
            }
            Err(err) => {
                tracing::warn!(%err, "routing entry unreadable, clearing every kind partition");
                for kind in EntityKind::ALL {
                    self.backend.remove(kind.partition(), &key)?;
                }
            }
        }
        self.backend.remove(ROUTING_PARTITION, &key)?;
        tracing::debug!(id = %id.short(), "deleted");
        Ok(Some(id))
    }

    fn delete_player_entries(&mut self, id: EntityId) -> Result<Option<EntityId>, StoreError> {
        let value = id.to_string();
        for key in self.backend.keys(PLAYERS_PARTITION)? {
            let points_here = self
                .backend
                .get(PLAYERS_PARTITION, &key)?
                .is_some_and(|bytes| bytes == value.as_bytes());
            if points_here {
                self.backend.remove(PLAYERS_PARTITION, &key)?;
            }
        }
        self.backend.remove(CREDENTIALS_PARTITION, &value)?;
        self.delete_record(id)
    }

    /// Decode the record for `id` from its kind partition and give it fresh
    /// transient state.
    fn read_payload(&self, id: EntityId, kind: EntityKind) -> Result<Entity, StoreError> {
        let payload = self
            .backend
            .get(kind.partition(), &id.to_string())?
            .ok_or_else(|| StoreError::load(id, "missing payload"))?;
        let mut entity = codec::decode_entity(&payload).map_err(|reason| StoreError::load(id, reason))?;
        if entity.id() != id {
            return Err(StoreError::load(id, format!("payload belongs to {}", entity.id())));
        }
        if entity.kind() != kind {
            return Err(StoreError::load(
                id,
                format!("payload is a {}, routed as {kind}", entity.kind()),
            ));
        }
        entity.rehydrate(None);
        Ok(entity)
    }

    fn load_into(
        &self,
        id: EntityId,
        registry: &mut EntityRegistry,
        fallback: Option<EntityId>,
    ) -> Result<(), StoreError> {
        if registry.contains(id) {
            return Ok(());
        }
        let kind = self.routing_kind(id)?.ok_or(StoreError::NoSuchEntity(id))?;
        let entity = self.read_payload(id, kind)?;
        let members = entity.contents();
        let container = entity.container();
        // Register before recursing so back-references from members and
        // ancestors resolve to this instance instead of loading a duplicate.
        registry.add(entity);
        tracing::trace!(id = %id.short(), %kind, members = members.len(), "decoded");

        let mut dropped = Vec::new();
        for member in members {
            match self.load_into(member, registry, fallback) {
                Ok(()) => {
                    if !claim_member(registry, id, member) {
                        tracing::debug!(owner = %id, member = %member, "member recorded elsewhere");
                        dropped.push(member);
                    }
                }
                Err(err) if err.is_unresolvable() => {
                    tracing::warn!(owner = %id, member = %member, %err, "dropping unresolvable member");
                    dropped.push(member);
                }
                Err(err) => return Err(err),
            }
        }
        if !dropped.is_empty() {
            if let Some(entity) = registry.lookup_mut(id) {
                entity.prune_contents(|m| !dropped.contains(&m));
            }
        }

        if let Some(parent) = container {
            match self.load_into(parent, registry, fallback) {
                Ok(()) => {
                    if !relist_in(registry, parent, id) {
                        self.relocate_to_fallback(id, registry, fallback);
                    }
                }
                Err(err) if err.is_unresolvable() => {
                    tracing::warn!(id = %id, parent = %parent, %err, "container unresolvable");
                    self.relocate_to_fallback(id, registry, fallback);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Point `id` at the fallback location and list it there. With no usable
    /// fallback the entity becomes top-level.
    fn relocate_to_fallback(
        &self,
        id: EntityId,
        registry: &mut EntityRegistry,
        fallback: Option<EntityId>,
    ) {
        let mut target = fallback.filter(|f| *f != id);
        if let Some(f) = target {
            if let Err(err) = self.load_into(f, registry, None) {
                tracing::warn!(fallback = %f, %err, "fallback location unavailable");
                target = None;
            }
        }
        if let Some(f) = target {
            if let Some(inv) = registry.lookup_mut(f).and_then(|e| e.inventory_mut()) {
                inv.force_insert(id);
            }
        }
        if let Some(entity) = registry.lookup_mut(id) {
            entity.set_container(target);
        }
        tracing::debug!(id = %id.short(), ?target, "relocated to fallback");
    }
}

/// Whether `member`'s own record places it in `owner`. A member recorded as
/// top-level is adopted by the owner listing it.
fn claim_member(registry: &mut EntityRegistry, owner: EntityId, member: EntityId) -> bool {
    let Some(child) = registry.lookup_mut(member) else {
        return false;
    };
    match child.container() {
        Some(container) => container == owner,
        None => {
            child.set_container(Some(owner));
            true
        }
    }
}

/// Make sure the loaded `parent` lists `id`. A crash between the two writes
/// of a move can leave the parent's record without it. Fails when the parent
/// has no inventory to put it in.
fn relist_in(registry: &mut EntityRegistry, parent: EntityId, id: EntityId) -> bool {
    registry.lookup_mut(parent).is_some_and(|p| {
        p.holds(id) || p.inventory_mut().map(|inv| inv.force_insert(id)).is_some()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_entity::{Blueprint, BufferedSession, EquipSlot, SessionHandle};
    use std::sync::Arc;

    fn spawn(
        registry: &mut EntityRegistry,
        kind: EntityKind,
        container: Option<EntityId>,
        blueprint: Blueprint,
    ) -> EntityId {
        let id = EntityId::new();
        registry.add(Entity::new(id, kind, container, blueprint));
        if let Some(c) = container {
            registry.lookup_mut(c).unwrap().stow(id).unwrap();
        }
        id
    }

    fn store_every(store: &PersistentStore, registry: &mut EntityRegistry) {
        let summary = store.save_all(registry);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn store_then_load_round_trips_persisted_fields() {
        let store = PersistentStore::in_memory();
        let mut live = EntityRegistry::new();
        let id = spawn(
            &mut live,
            EntityKind::Item,
            None,
            Blueprint::named("Lamp").with_description("brass").with_attribute("lit", "no"),
        );
        store.store(id, &mut live).unwrap();
        assert_eq!(store.save_count().unwrap(), 1);
        assert_eq!(store.kind_of(id).unwrap(), Some(EntityKind::Item));

        let mut fresh = EntityRegistry::new();
        let loaded = store.load(id, &mut fresh).unwrap();
        assert_eq!(loaded.id(), id);
        assert_eq!(loaded.name, "Lamp");
        assert_eq!(loaded.description, "brass");
        assert_eq!(loaded.attribute("lit"), Some("no"));
    }

    #[test]
    fn store_leaves_session_attached() {
        let store = PersistentStore::in_memory();
        let mut live = EntityRegistry::new();
        let id = spawn(&mut live, EntityKind::Player, None, Blueprint::named("Ann"));
        let session: SessionHandle = BufferedSession::new();
        live.lookup_mut(id).unwrap().attach_session(session.clone());

        store.store(id, &mut live).unwrap();

        let after = live.lookup(id).unwrap().session().unwrap();
        assert!(Arc::ptr_eq(after, &session));
    }

    #[test]
    fn store_recurses_into_equipment_only() {
        let store = PersistentStore::in_memory();
        let mut live = EntityRegistry::new();
        let knight = spawn(&mut live, EntityKind::Player, None, Blueprint::named("Knight"));
        let sword = spawn(&mut live, EntityKind::Item, None, Blueprint::named("Sword"));
        let coin = spawn(&mut live, EntityKind::Item, Some(knight), Blueprint::named("Coin"));
        live.lookup_mut(knight)
            .unwrap()
            .equip(EquipSlot::MainHand, sword)
            .unwrap();
        live.lookup_mut(sword).unwrap().set_container(Some(knight));

        store.store(knight, &mut live).unwrap();
        assert!(store.contains(knight).unwrap());
        assert!(store.contains(sword).unwrap());
        assert!(!store.contains(coin).unwrap());
    }

    #[test]
    fn load_resolves_members_and_relinks_container() {
        let store = PersistentStore::in_memory();
        let mut live = EntityRegistry::new();
        let room = spawn(&mut live, EntityKind::Room, None, Blueprint::named("Hall"));
        let chest = spawn(
            &mut live,
            EntityKind::Item,
            Some(room),
            Blueprint::named("Chest").with_capacity(3),
        );
        let gem = spawn(&mut live, EntityKind::Item, Some(chest), Blueprint::named("Gem"));
        store_every(&store, &mut live);

        let mut fresh = EntityRegistry::new();
        store.load(room, &mut fresh).unwrap();
        assert_eq!(fresh.count(), 3);
        assert_eq!(fresh.lookup(chest).unwrap().container(), Some(room));
        assert_eq!(fresh.lookup(gem).unwrap().container(), Some(chest));
    }

    #[test]
    fn loading_grandchild_pulls_in_ancestor_chain() {
        let store = PersistentStore::in_memory();
        let mut live = EntityRegistry::new();
        let room = spawn(&mut live, EntityKind::Room, None, Blueprint::named("Hall"));
        let chest = spawn(
            &mut live,
            EntityKind::Item,
            Some(room),
            Blueprint::named("Chest").with_capacity(3),
        );
        let gem = spawn(&mut live, EntityKind::Item, Some(chest), Blueprint::named("Gem"));
        store_every(&store, &mut live);

        let mut fresh = EntityRegistry::new();
        store.load(gem, &mut fresh).unwrap();
        assert!(fresh.contains(chest));
        assert!(fresh.contains(room));
        assert_eq!(fresh.count(), 3);
        assert!(fresh.lookup(room).unwrap().holds(chest));
    }

    #[test]
    fn already_registered_members_are_reused() {
        let store = PersistentStore::in_memory();
        let mut live = EntityRegistry::new();
        let room = spawn(&mut live, EntityKind::Room, None, Blueprint::named("Hall"));
        let rock = spawn(&mut live, EntityKind::Item, Some(room), Blueprint::named("Rock"));
        store_every(&store, &mut live);

        let mut fresh = EntityRegistry::new();
        store.load(rock, &mut fresh).unwrap();
        fresh.lookup_mut(rock).unwrap().name = "Edited".into();
        store.load(room, &mut fresh).unwrap();
        assert_eq!(fresh.lookup(rock).unwrap().name, "Edited");
        assert_eq!(fresh.count(), 2);
    }

    #[test]
    fn missing_ancestor_falls_back() {
        let mut live = EntityRegistry::new();
        let void = spawn(&mut live, EntityKind::Room, None, Blueprint::named("Void"));
        let store = PersistentStore::in_memory().with_fallback(void);
        let room = spawn(&mut live, EntityKind::Room, None, Blueprint::named("Hall"));
        let rock = spawn(&mut live, EntityKind::Item, Some(room), Blueprint::named("Rock"));
        store_every(&store, &mut live);
        store.delete(room).unwrap();

        let mut fresh = EntityRegistry::new();
        let loaded = store.load(rock, &mut fresh).unwrap();
        assert_eq!(loaded.container(), Some(void));
        assert!(fresh.lookup(void).unwrap().holds(rock));
    }

    #[test]
    fn missing_ancestor_without_fallback_becomes_top_level() {
        let store = PersistentStore::in_memory();
        let mut live = EntityRegistry::new();
        let rock = spawn(&mut live, EntityKind::Item, None, Blueprint::named("Rock"));
        live.lookup_mut(rock).unwrap().set_container(Some(EntityId::new()));
        store_every(&store, &mut live);

        let mut fresh = EntityRegistry::new();
        assert_eq!(store.load(rock, &mut fresh).unwrap().container(), None);
    }

    #[test]
    fn unknown_id_is_no_such_entity() {
        let store = PersistentStore::in_memory();
        let mut fresh = EntityRegistry::new();
        match store.load(EntityId::new(), &mut fresh) {
            Err(StoreError::NoSuchEntity(_)) => {}
            other => panic!("expected NoSuchEntity, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_payload_is_object_load_error() {
        let store = PersistentStore::in_memory();
        let id = EntityId::new();
        store.put_raw(ROUTING_PARTITION, &id.to_string(), b"item");
        store.put_raw("item", &id.to_string(), b"");

        let mut fresh = EntityRegistry::new();
        match store.load(id, &mut fresh) {
            Err(StoreError::ObjectLoadError { id: failed, .. }) => assert_eq!(failed, id),
            other => panic!("expected ObjectLoadError, got {other:?}"),
        }
        assert!(fresh.is_empty());
    }

    #[test]
    fn unresolvable_member_is_pruned() {
        let store = PersistentStore::in_memory();
        let mut live = EntityRegistry::new();
        let room = spawn(&mut live, EntityKind::Room, None, Blueprint::named("Hall"));
        let ghost = spawn(&mut live, EntityKind::Item, Some(room), Blueprint::named("Ghost"));
        store_every(&store, &mut live);
        store.delete(ghost).unwrap();

        let mut fresh = EntityRegistry::new();
        let loaded = store.load(room, &mut fresh).unwrap();
        assert!(!loaded.holds(ghost));
    }

    #[test]
    fn key_scenario_store_delete_load() {
        let store = PersistentStore::in_memory();
        let mut live = EntityRegistry::new();
        let room = spawn(&mut live, EntityKind::Room, None, Blueprint::named("R"));
        let key = spawn(&mut live, EntityKind::Item, Some(room), Blueprint::named("Key"));
        store.store(key, &mut live).unwrap();

        assert_eq!(store.delete(key).unwrap(), Some(key));
        assert_eq!(store.delete(key).unwrap(), None);

        let mut fresh = EntityRegistry::new();
        assert!(matches!(
            store.load(key, &mut fresh),
            Err(StoreError::NoSuchEntity(id)) if id == key
        ));
    }

    #[test]
    fn load_all_tolerates_forward_references() {
        let store = PersistentStore::in_memory();
        let mut live = EntityRegistry::new();
        let room = spawn(&mut live, EntityKind::Room, None, Blueprint::named("Hall"));
        let mut items = Vec::new();
        for i in 0..10 {
            items.push(spawn(
                &mut live,
                EntityKind::Item,
                Some(room),
                Blueprint::named(format!("item{i}")),
            ));
        }
        let ann = spawn(&mut live, EntityKind::Player, Some(room), Blueprint::named("Ann"));
        store_every(&store, &mut live);

        let mut fresh = EntityRegistry::new();
        let summary = store.load_all(false, &mut fresh).unwrap();
        assert_eq!(summary.loaded, 11);
        assert!(!fresh.contains(ann));
        for item in &items {
            assert_eq!(fresh.lookup(*item).unwrap().container(), Some(room));
        }
        // The offline player still exists, so the room keeps listing it.
        assert!(fresh.lookup(room).unwrap().holds(ann));

        let mut everyone = EntityRegistry::new();
        let summary = store.load_all(true, &mut everyone).unwrap();
        assert_eq!(summary.loaded, 12);
        assert_eq!(everyone.count_of(EntityKind::Player), 1);
    }

    /// Records left by a move that stopped after writing the item: the old
    /// room still lists it, the new room does not yet.
    fn half_moved(store: &PersistentStore) -> (EntityId, EntityId, EntityId) {
        let mut live = EntityRegistry::new();
        let old = spawn(&mut live, EntityKind::Room, None, Blueprint::named("Old"));
        let new = spawn(&mut live, EntityKind::Room, None, Blueprint::named("New"));
        let chest = spawn(&mut live, EntityKind::Item, Some(old), Blueprint::named("Chest"));
        live.lookup_mut(chest).unwrap().set_container(Some(new));
        store_every(store, &mut live);
        (old, new, chest)
    }

    #[test]
    fn item_record_decides_its_container_on_load() {
        let store = PersistentStore::in_memory();
        let (old, new, chest) = half_moved(&store);

        let mut fresh = EntityRegistry::new();
        store.load(old, &mut fresh).unwrap();
        assert!(!fresh.lookup(old).unwrap().holds(chest));
        assert!(fresh.lookup(new).unwrap().holds(chest));
        assert_eq!(fresh.lookup(chest).unwrap().container(), Some(new));
    }

    #[test]
    fn item_record_decides_its_container_on_load_all() {
        let store = PersistentStore::in_memory();
        let (old, new, chest) = half_moved(&store);

        let mut fresh = EntityRegistry::new();
        let summary = store.load_all(false, &mut fresh).unwrap();
        assert_eq!(summary.loaded, 3);
        assert!(!fresh.lookup(old).unwrap().holds(chest));
        assert!(fresh.lookup(new).unwrap().holds(chest));
        assert_eq!(fresh.lookup(chest).unwrap().container(), Some(new));
    }

    #[test]
    fn load_all_relists_member_its_container_forgot() {
        let store = PersistentStore::in_memory();
        let mut live = EntityRegistry::new();
        let room = spawn(&mut live, EntityKind::Room, None, Blueprint::named("Hall"));
        let rock = spawn(&mut live, EntityKind::Item, Some(room), Blueprint::named("Rock"));
        live.lookup_mut(room).unwrap().release(rock);
        store_every(&store, &mut live);

        let mut fresh = EntityRegistry::new();
        store.load_all(false, &mut fresh).unwrap();
        assert!(fresh.lookup(room).unwrap().holds(rock));
        assert_eq!(fresh.lookup(rock).unwrap().container(), Some(room));
    }

    #[test]
    fn load_all_skips_corrupt_records() {
        let store = PersistentStore::in_memory();
        let mut live = EntityRegistry::new();
        spawn(&mut live, EntityKind::Room, None, Blueprint::named("Hall"));
        store_every(&store, &mut live);
        let bad = EntityId::new();
        store.put_raw(ROUTING_PARTITION, &bad.to_string(), b"room");
        store.put_raw("room", &bad.to_string(), b"junk");

        let mut fresh = EntityRegistry::new();
        let summary = store.load_all(true, &mut fresh).unwrap();
        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn save_all_indexes_players() {
        let store = PersistentStore::in_memory();
        let mut live = EntityRegistry::new();
        let ann = spawn(&mut live, EntityKind::Player, None, Blueprint::named("Ann"));
        spawn(&mut live, EntityKind::Item, None, Blueprint::named("Rock"));
        let summary = store.save_all(&mut live);
        assert_eq!(summary, SaveSummary { saved: 2, failed: 0 });
        assert!(store.player_exists("ANN").unwrap());
        assert_eq!(store.player_id("ann").unwrap(), Some(ann));
        assert_eq!(store.partition_len(PLAYERS_PARTITION).unwrap(), 1);
    }

    #[test]
    fn credentials_check_and_authenticate() {
        let store = PersistentStore::in_memory();
        let mut ann = Entity::new(EntityId::new(), EntityKind::Player, None, Blueprint::named("Ann"));
        store.save_player(&mut ann).unwrap();
        store.set_credential(ann.id(), "s3cret").unwrap();

        assert!(store.check_credential("ann", "s3cret").unwrap());
        assert!(!store.check_credential("ann", "wrong").unwrap());
        assert_eq!(store.authenticate("Ann", "s3cret").unwrap(), ann.id());
        assert!(matches!(
            store.authenticate("Ann", "wrong"),
            Err(StoreError::BadCredential(_))
        ));
        assert!(matches!(
            store.check_credential("bob", "x"),
            Err(StoreError::UnknownCharacter(_))
        ));

        store.set_credential_for("ANN", "rotated").unwrap();
        assert!(store.check_credential("ann", "rotated").unwrap());
    }

    #[test]
    fn player_without_credential_never_authenticates() {
        let store = PersistentStore::in_memory();
        let mut ann = Entity::new(EntityId::new(), EntityKind::Player, None, Blueprint::named("Ann"));
        store.save_player(&mut ann).unwrap();
        assert!(!store.check_credential("ann", "").unwrap());
    }

    #[test]
    fn delete_player_removes_all_indices() {
        let store = PersistentStore::in_memory();
        let mut ann = Entity::new(EntityId::new(), EntityKind::Player, None, Blueprint::named("Ann"));
        store.save_player(&mut ann).unwrap();
        store.set_credential(ann.id(), "pw").unwrap();

        assert_eq!(store.delete_player("ANN").unwrap(), ann.id());
        assert!(!store.player_exists("ann").unwrap());
        assert!(!store.contains(ann.id()).unwrap());
        assert_eq!(store.partition_len(CREDENTIALS_PARTITION).unwrap(), 0);
        assert!(matches!(
            store.delete_player("ann"),
            Err(StoreError::UnknownCharacter(_))
        ));
    }

    #[test]
    fn delete_player_by_id_clears_index_after_rename() {
        let store = PersistentStore::in_memory();
        let mut ann = Entity::new(EntityId::new(), EntityKind::Player, None, Blueprint::named("Ann"));
        store.save_player(&mut ann).unwrap();
        store.set_credential(ann.id(), "pw").unwrap();
        ann.name = "Anna".into();
        store.save_player(&mut ann).unwrap();
        assert_eq!(store.partition_len(PLAYERS_PARTITION).unwrap(), 2);

        assert_eq!(store.delete_player_by_id(ann.id()).unwrap(), Some(ann.id()));
        assert!(!store.player_exists("ann").unwrap());
        assert!(!store.player_exists("anna").unwrap());
        assert_eq!(store.partition_len(PLAYERS_PARTITION).unwrap(), 0);
        assert_eq!(store.partition_len(CREDENTIALS_PARTITION).unwrap(), 0);
        assert!(!store.contains(ann.id()).unwrap());
        assert_eq!(store.delete_player_by_id(ann.id()).unwrap(), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("world");
        let mut live = EntityRegistry::new();
        let room = spawn(&mut live, EntityKind::Room, None, Blueprint::named("Hall"));
        let rock = spawn(&mut live, EntityKind::Item, Some(room), Blueprint::named("Rock"));
        {
            let store = PersistentStore::open(&path).unwrap();
            store_every(&store, &mut live);
        }

        let store = PersistentStore::open(&path).unwrap();
        assert_eq!(store.entities().unwrap().len(), 2);
        let mut fresh = EntityRegistry::new();
        store.load(rock, &mut fresh).unwrap();
        assert!(fresh.lookup(room).unwrap().holds(rock));
    }
}
