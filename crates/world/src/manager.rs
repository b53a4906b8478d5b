use crate::action::Action;
use crate::config::WorldConfig;
use crate::error::WorldError;
use crate::events::{EventBus, WorldEvent};
use crate::hook::{HookContext, UpdateHook};
use realm_common::{EntityId, EntityKind};
use realm_entity::{Blueprint, EquipSlot, Entity, SessionHandle};
use realm_kernel::{ActionScheduler, EntityRegistry, Scheduled};
use realm_persist::{
    CachingEntityRegistry, EvictionSummary, LoadSummary, PersistentStore, SaveSummary,
};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// What happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Entities whose update hooks ran.
    pub updated: usize,
    pub hook_errors: usize,
    pub actions_run: usize,
    pub actions_failed: usize,
    pub saved: Option<SaveSummary>,
    pub evicted: Option<EvictionSummary>,
}

/// Orchestrates the registry, the store and the scheduler.
///
/// One instance is created at startup and passed explicitly to whatever needs
/// it. All simulation state changes go through `&mut self`, which is what
/// keeps the tick loop single-threaded.
pub struct WorldManager {
    config: WorldConfig,
    store: Arc<PersistentStore>,
    entities: CachingEntityRegistry,
    scheduler: ActionScheduler<Action>,
    hooks: Vec<Box<dyn UpdateHook>>,
    events: EventBus,
    /// Players that are logged in, as opposed to merely loaded.
    online: BTreeSet<EntityId>,
    ticks: u64,
}

impl fmt::Debug for WorldManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldManager")
            .field("ticks", &self.ticks)
            .field("entities", &self.entities.count())
            .field("online", &self.online.len())
            .field("pending_actions", &self.scheduler.len())
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl WorldManager {
    /// Wrap `store` and make sure the fallback location exists, creating it
    /// on first run.
    pub fn new(config: WorldConfig, store: PersistentStore) -> Result<Self, WorldError> {
        let store = Arc::new(store.with_fallback(config.fallback_id));
        let mut world = Self {
            entities: CachingEntityRegistry::new(Arc::clone(&store)),
            store,
            config,
            scheduler: ActionScheduler::new(),
            hooks: Vec::new(),
            events: EventBus::default(),
            online: BTreeSet::new(),
            ticks: 0,
        };
        world.bootstrap_fallback()?;
        Ok(world)
    }

    fn bootstrap_fallback(&mut self) -> Result<(), WorldError> {
        let id = self.config.fallback_id;
        if self.entities.lookup(id)?.is_some() {
            tracing::info!(id = %id, "fallback location loaded");
            return Ok(());
        }
        let mut void = Entity::new(
            id,
            EntityKind::Room,
            None,
            Blueprint::named(self.config.fallback_name.clone()),
        );
        self.store.store_entity(&mut void)?;
        self.entities.add(void);
        tracing::info!(id = %id, "fallback location created");
        Ok(())
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<PersistentStore> {
        &self.store
    }

    pub fn fallback_id(&self) -> EntityId {
        self.config.fallback_id
    }

    /// Loaded entities only; nothing is pulled from the store.
    pub fn registry(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Simulated time elapsed since startup.
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    pub fn pending_actions(&self) -> usize {
        self.scheduler.len()
    }

    pub fn online_players(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.online.iter().copied()
    }

    pub fn is_online(&self, id: EntityId) -> bool {
        self.online.contains(&id)
    }

    // --- queries ---

    /// Live instance for `id`, demand-loaded from the store on a miss.
    pub fn lookup(&mut self, id: EntityId) -> Result<Option<&Entity>, WorldError> {
        Ok(self.entities.lookup(id)?)
    }

    pub fn lookup_mut(&mut self, id: EntityId) -> Result<Option<&mut Entity>, WorldError> {
        Ok(self.entities.lookup_mut(id)?)
    }

    /// Scan loaded entities in insertion order.
    pub fn find_all(&self, predicate: impl FnMut(&Entity) -> bool) -> Vec<&Entity> {
        self.entities.find_all(predicate)
    }

    pub fn subscribe(&mut self) -> Receiver<WorldEvent> {
        self.events.subscribe()
    }

    pub fn add_hook(&mut self, hook: impl UpdateHook + 'static) {
        tracing::debug!(hook = hook.name(), "update hook registered");
        self.hooks.push(Box::new(hook));
    }

    pub fn submit_action(&mut self, action: Action, priority: i32, delay: Option<Duration>) {
        tracing::trace!(action = action.label(), priority, ?delay, "action submitted");
        self.scheduler.submit(action, priority, delay);
    }

    // --- entity lifecycle ---

    /// Create and register a new entity, optionally inside `container`.
    /// Non-player entities are persisted right away; players persist through
    /// the player path at login, logout and save.
    pub fn create_entity(
        &mut self,
        kind: EntityKind,
        container: Option<EntityId>,
        blueprint: Blueprint,
    ) -> Result<EntityId, WorldError> {
        let id = self.allocate_id()?;
        if let Some(c) = container {
            self.entity_mut(c)?.stow(id)?;
        }
        self.entities.add(Entity::new(id, kind, container, blueprint));
        tracing::debug!(id = %id.short(), %kind, "entity created");
        self.events.publish(WorldEvent::EntityAdded {
            id,
            kind,
            container,
        });

        if kind != EntityKind::Player {
            self.persist(id);
        }
        if let Some(c) = container {
            self.persist(c);
        }
        Ok(id)
    }

    /// Remove an entity for good. Its contents move to the fallback location
    /// and it is detached from its container first.
    pub fn delete_entity(&mut self, id: EntityId) -> Result<(), WorldError> {
        let fallback = self.config.fallback_id;
        if id == fallback {
            return Err(WorldError::Protected(id));
        }
        let entity = self.entity_mut(id)?;
        let kind = entity.kind();
        let container = entity.container();
        let session = entity.detach_session();
        let members = entity.release_all();

        let mut moved = Vec::with_capacity(members.len());
        for member in members {
            if member == fallback {
                if let Some(void) = self.entities.peek_mut(fallback) {
                    void.set_container(None);
                }
                continue;
            }
            match self.entities.lookup_mut(member) {
                Ok(Some(child)) => {
                    child.set_container(Some(fallback));
                    moved.push(member);
                }
                Ok(None) => tracing::warn!(member = %member, "dropping unknown member"),
                Err(err) => tracing::warn!(member = %member, %err, "dropping unloadable member"),
            }
        }
        match self.entities.lookup_mut(fallback) {
            Ok(Some(void)) => {
                if let Some(inv) = void.inventory_mut() {
                    for member in &moved {
                        inv.force_insert(*member);
                    }
                }
            }
            Ok(None) => tracing::error!(fallback = %fallback, "fallback location missing"),
            Err(err) => tracing::error!(fallback = %fallback, %err, "fallback location unloadable"),
        }

        if let Some(c) = container {
            self.detach_from(c, id);
        }
        self.entities.remove(id);
        self.online.remove(&id);
        if let Some(session) = session {
            session.close();
        }

        if kind == EntityKind::Player {
            self.store.delete_player_by_id(id)?;
        } else {
            self.store.delete(id)?;
        }

        for member in moved {
            self.persist(member);
        }
        self.persist(fallback);
        tracing::debug!(id = %id.short(), %kind, "entity deleted");
        self.events.publish(WorldEvent::EntityRemoved { id, kind });
        Ok(())
    }

    // --- players ---

    /// Register a new character and log it in. `location` defaults to the
    /// fallback location.
    pub fn create_player(
        &mut self,
        name: &str,
        secret: &str,
        location: Option<EntityId>,
    ) -> Result<EntityId, WorldError> {
        if self.store.player_exists(name)? || self.entities.find_player(name).is_some() {
            return Err(WorldError::NameTaken(name.to_string()));
        }
        let location = location.unwrap_or(self.config.fallback_id);
        let id = self.create_entity(EntityKind::Player, Some(location), Blueprint::named(name))?;

        let player = self
            .entities
            .peek_mut(id)
            .ok_or(WorldError::NoSuchEntity(id))?;
        self.store.save_player(player)?;
        self.store.set_credential(id, secret)?;

        self.online.insert(id);
        tracing::info!(name, id = %id, "player created");
        self.events.publish(WorldEvent::PlayerLoaded {
            id,
            name: name.to_string(),
        });
        Ok(id)
    }

    /// Authenticate and bring a character into the world. Authentication
    /// failures propagate so the login layer can prompt again.
    pub fn load_player(&mut self, name: &str, secret: &str) -> Result<EntityId, WorldError> {
        let id = self.store.authenticate(name, secret)?;
        let taken = self.online.contains(&id)
            || self
                .entities
                .find_player(name)
                .is_some_and(|other| other.id() != id);
        if taken {
            return Err(WorldError::CharacterAlreadyLoaded(name.to_string()));
        }

        let player = self
            .entities
            .lookup(id)?
            .ok_or(WorldError::NoSuchEntity(id))?;
        let name = player.name.clone();
        self.online.insert(id);
        tracing::info!(name = %name, id = %id, "player logged in");
        self.events.publish(WorldEvent::PlayerLoaded { id, name });
        Ok(id)
    }

    /// Save and unload a player and close its session. Never fails; problems
    /// are logged so connection teardown always completes.
    pub fn drop_player(&mut self, id: EntityId) {
        let Some(player) = self.entities.peek_mut(id) else {
            tracing::warn!(id = %id, "drop_player: not loaded");
            self.online.remove(&id);
            return;
        };
        let name = player.name.clone();
        if let Err(err) = self.store.save_player(player) {
            tracing::error!(name = %name, %err, "failed to save player on logout");
        }
        let session = player.detach_session();
        let container = player.container();

        if let Some(c) = container {
            self.detach_from(c, id);
        }
        self.entities.remove(id);
        self.online.remove(&id);
        if let Some(session) = session {
            session.close();
        }
        tracing::info!(name = %name, id = %id, "player logged out");
        self.events.publish(WorldEvent::PlayerDropped { id, name });
    }

    /// Bind a live connection to a loaded entity, returning the one it replaces.
    pub fn attach_session(
        &mut self,
        id: EntityId,
        session: SessionHandle,
    ) -> Result<Option<SessionHandle>, WorldError> {
        Ok(self.entity_mut(id)?.attach_session(session))
    }

    // --- containment ---

    /// Put `id` into `destination`'s inventory, taking it out of wherever it was.
    pub fn move_entity(&mut self, id: EntityId, destination: EntityId) -> Result<(), WorldError> {
        if id == self.config.fallback_id {
            return Err(WorldError::Protected(id));
        }
        if id == destination || self.is_within(destination, id)? {
            return Err(WorldError::InvalidMove {
                item: id,
                destination,
            });
        }
        let old = self.entity_mut(id)?.container();
        if let Some(o) = old {
            self.entities.lookup(o)?;
        }

        let dest = self.entity_mut(destination)?;
        if dest.inventory().is_some_and(|inv| inv.contains(id)) {
            return Ok(());
        }
        dest.stow(id)?;
        if old == Some(destination) {
            if let Some(eq) = dest.equipment_mut() {
                eq.remove_item(id);
            }
        } else if let Some(o) = old {
            if let Some(parent) = self.entities.peek_mut(o) {
                parent.release(id);
            }
        }
        self.entity_mut(id)?.set_container(Some(destination));

        self.persist(id);
        if let Some(o) = old.filter(|o| *o != destination) {
            self.persist(o);
        }
        self.persist(destination);
        Ok(())
    }

    pub fn equip(
        &mut self,
        wearer: EntityId,
        slot: EquipSlot,
        item: EntityId,
    ) -> Result<(), WorldError> {
        if item == self.config.fallback_id {
            return Err(WorldError::Protected(item));
        }
        if wearer == item || self.is_within(wearer, item)? {
            return Err(WorldError::InvalidMove {
                item,
                destination: wearer,
            });
        }
        let old = self.entity_mut(item)?.container();
        if let Some(o) = old {
            self.entities.lookup(o)?;
        }

        let w = self.entity_mut(wearer)?;
        if w.equipment().is_some_and(|eq| eq.slot_of(item).is_some()) {
            return Err(WorldError::InvalidMove {
                item,
                destination: wearer,
            });
        }
        w.equip(slot, item)?;
        match old {
            Some(o) if o == wearer => {
                if let Some(inv) = w.inventory_mut() {
                    inv.remove(item);
                }
            }
            Some(o) => {
                if let Some(parent) = self.entities.peek_mut(o) {
                    parent.release(item);
                }
            }
            None => {}
        }
        self.entity_mut(item)?.set_container(Some(wearer));

        self.persist(item);
        if let Some(o) = old.filter(|o| *o != wearer) {
            self.persist(o);
        }
        self.persist(wearer);
        Ok(())
    }

    /// Move whatever is in `slot` back into the wearer's inventory.
    pub fn unequip(
        &mut self,
        wearer: EntityId,
        slot: EquipSlot,
    ) -> Result<Option<EntityId>, WorldError> {
        let w = self.entity_mut(wearer)?;
        let Some(item) = w.equipment().and_then(|eq| eq.get(slot)) else {
            return Ok(None);
        };
        w.stow(item)?;
        if let Some(eq) = w.equipment_mut() {
            eq.unequip(slot);
        }
        self.persist(wearer);
        Ok(Some(item))
    }

    // --- tick loop ---

    /// Advance by one configured tick interval.
    pub fn tick(&mut self) -> TickReport {
        self.advance(self.config.tick_interval())
    }

    /// Run one tick of `dt` simulated time: update hooks for every entity
    /// loaded at the start of the tick, then the batch of actions that was due
    /// at the start of the tick, then any periodic save or eviction.
    pub fn advance(&mut self, dt: Duration) -> TickReport {
        self.ticks += 1;
        let tick = self.ticks;
        let _span = tracing::debug_span!("tick", tick).entered();
        let now = self.scheduler.now().saturating_add(dt);
        self.scheduler.advance_to(now);
        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };

        let batch = self.scheduler.drain_due();
        let snapshot = self.entities.ids();
        for id in snapshot {
            let Some(entity) = self.entities.peek_mut(id) else {
                continue;
            };
            if !entity.begin_update() {
                continue;
            }
            let mut ctx = HookContext {
                tick,
                now,
                scheduler: &mut self.scheduler,
            };
            for hook in &mut self.hooks {
                if let Err(err) = hook.update(entity, &mut ctx) {
                    tracing::warn!(hook = hook.name(), id = %id, %err, "update hook failed");
                    report.hook_errors += 1;
                }
            }
            entity.end_update();
            report.updated += 1;
        }

        for Scheduled { payload, priority } in batch {
            let label = payload.label().to_string();
            match payload.run(self) {
                Ok(()) => report.actions_run += 1,
                Err(err) => {
                    tracing::warn!(action = %label, priority, %err, "action failed");
                    report.actions_failed += 1;
                }
            }
        }

        if self.config.autosave_due(tick) {
            report.saved = Some(self.save_all());
        }
        if self.config.eviction_due(tick) {
            report.evicted = Some(self.evict_idle());
        }
        report
    }

    /// Warm the registry with everything persisted, optionally including
    /// offline players.
    pub fn load_all(&mut self, include_players: bool) -> Result<LoadSummary, WorldError> {
        Ok(self.store.load_all(include_players, &mut self.entities)?)
    }

    /// Store every loaded entity. Failures are logged and counted.
    pub fn save_all(&mut self) -> SaveSummary {
        self.store.save_all(&mut self.entities)
    }

    pub fn evict_idle(&mut self) -> EvictionSummary {
        self.entities.evict_idle()
    }

    /// Log out every online player, then save whatever is still loaded.
    pub fn shutdown(&mut self) -> SaveSummary {
        let online: Vec<EntityId> = self.online.iter().copied().collect();
        for id in online {
            self.drop_player(id);
        }
        let summary = self.save_all();
        tracing::info!(saved = summary.saved, failed = summary.failed, "world shut down");
        summary
    }

    // --- internals ---

    fn entity_mut(&mut self, id: EntityId) -> Result<&mut Entity, WorldError> {
        self.entities
            .lookup_mut(id)?
            .ok_or(WorldError::NoSuchEntity(id))
    }

    fn allocate_id(&self) -> Result<EntityId, WorldError> {
        loop {
            let id = EntityId::new();
            if !self.entities.contains(id) && !self.store.contains(id)? {
                return Ok(id);
            }
            tracing::warn!(id = %id, "id collision, drawing again");
        }
    }

    /// Whether `ancestor` appears on `id`'s container chain.
    fn is_within(&mut self, id: EntityId, ancestor: EntityId) -> Result<bool, WorldError> {
        let mut seen = HashSet::new();
        let mut cursor = id;
        while seen.insert(cursor) {
            let Some(entity) = self.entities.lookup(cursor)? else {
                return Ok(false);
            };
            match entity.container() {
                Some(c) if c == ancestor => return Ok(true),
                Some(c) => cursor = c,
                None => return Ok(false),
            }
        }
        Ok(false)
    }

    /// Best effort: take `child` out of `parent` and persist the parent.
    fn detach_from(&mut self, parent: EntityId, child: EntityId) {
        match self.entities.lookup_mut(parent) {
            Ok(Some(p)) => {
                p.release(child);
                self.persist(parent);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(parent = %parent, %err, "could not detach from container"),
        }
    }

    /// Best-effort write of a loaded non-player entity.
    fn persist(&mut self, id: EntityId) {
        let Some(entity) = self.entities.peek_mut(id) else {
            return;
        };
        if entity.is_player() {
            return;
        }
        if let Err(err) = self.store.store_entity(entity) {
            tracing::warn!(id = %id, %err, "persist failed");
        }
    }
}
