use crate::capability::{EquipSlot, Equipment, Inventory, InventoryError, Stats};
use crate::protocol::Persistable;
use crate::transient::{SessionHandle, Transient};
use realm_common::{EntityId, EntityKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Constructor arguments for a new entity.
#[derive(Debug, Clone, Default)]
pub struct Blueprint {
    pub name: String,
    pub description: String,
    /// Inventory capacity. Items only get an inventory when this is set.
    pub capacity: Option<usize>,
    pub stats: Option<Stats>,
    pub attributes: BTreeMap<String, String>,
}

impl Blueprint {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_stats(mut self, stats: Stats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Any simulated object: room, item, creature or player.
///
/// Capability substructures are present only for kinds that declare them;
/// call sites check for them explicitly (`inventory()`, `equipment()`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    kind: EntityKind,
    pub name: String,
    pub description: String,
    /// Non-owning link to the containing entity, resolved through the registry.
    container: Option<EntityId>,
    inventory: Option<Inventory>,
    equipment: Option<Equipment>,
    pub stats: Option<Stats>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Reentrancy guard for the per-tick update hook.
    #[serde(skip)]
    busy: bool,
    #[serde(skip)]
    transient: Transient,
}

impl Entity {
    pub fn new(
        id: EntityId,
        kind: EntityKind,
        container: Option<EntityId>,
        blueprint: Blueprint,
    ) -> Self {
        let (inventory, equipment, stats) = match kind {
            EntityKind::Room => (Some(Inventory::new(blueprint.capacity)), None, None),
            EntityKind::Item => (blueprint.capacity.map(|c| Inventory::new(Some(c))), None, None),
            EntityKind::Creature | EntityKind::Player => (
                Some(Inventory::new(blueprint.capacity)),
                Some(Equipment::new()),
                Some(blueprint.stats.unwrap_or_default()),
            ),
        };
        Self {
            id,
            kind,
            name: blueprint.name,
            description: blueprint.description,
            container,
            inventory,
            equipment,
            stats: stats.or(blueprint.stats),
            attributes: blueprint.attributes,
            busy: false,
            transient: Transient::default(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn container(&self) -> Option<EntityId> {
        self.container
    }

    pub fn set_container(&mut self, container: Option<EntityId>) {
        self.container = container;
    }

    pub fn is_player(&self) -> bool {
        self.kind == EntityKind::Player
    }

    /// A creature currently driven by a live session.
    pub fn is_controlled(&self) -> bool {
        self.kind == EntityKind::Creature && self.transient.session.is_some()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    // --- capabilities ---

    pub fn inventory(&self) -> Option<&Inventory> {
        self.inventory.as_ref()
    }

    pub fn inventory_mut(&mut self) -> Option<&mut Inventory> {
        self.inventory.as_mut()
    }

    pub fn equipment(&self) -> Option<&Equipment> {
        self.equipment.as_ref()
    }

    pub fn equipment_mut(&mut self) -> Option<&mut Equipment> {
        self.equipment.as_mut()
    }

    /// Place `item` in this entity's inventory.
    pub fn stow(&mut self, item: EntityId) -> Result<(), InventoryError> {
        let owner = self.id;
        self.inventory
            .as_mut()
            .ok_or(InventoryError::NoInventory(owner))?
            .insert(owner, item)
    }

    pub fn equip(&mut self, slot: EquipSlot, item: EntityId) -> Result<(), InventoryError> {
        let wearer = self.id;
        self.equipment
            .as_mut()
            .ok_or(InventoryError::NoEquipment(wearer))?
            .equip(wearer, slot, item)
    }

    /// Inventory members followed by equipped members.
    pub fn contents(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .inventory
            .as_ref()
            .map(|inv| inv.items().to_vec())
            .unwrap_or_default();
        ids.extend(self.equipped());
        ids
    }

    pub fn equipped(&self) -> Vec<EntityId> {
        self.equipment
            .as_ref()
            .map(Equipment::items)
            .unwrap_or_default()
    }

    pub fn holds(&self, item: EntityId) -> bool {
        self.inventory.as_ref().is_some_and(|inv| inv.contains(item))
            || self
                .equipment
                .as_ref()
                .is_some_and(|eq| eq.slot_of(item).is_some())
    }

    /// Remove `item` from inventory or equipment. Returns whether it was held.
    pub fn release(&mut self, item: EntityId) -> bool {
        let from_inventory = self.inventory.as_mut().is_some_and(|inv| inv.remove(item));
        let from_equipment = self
            .equipment
            .as_mut()
            .is_some_and(|eq| eq.remove_item(item));
        self.transient.description_cache = None;
        from_inventory || from_equipment
    }

    /// Empty inventory and equipment, returning every id that was held.
    pub fn release_all(&mut self) -> Vec<EntityId> {
        let mut ids = self
            .inventory
            .as_mut()
            .map(Inventory::take_all)
            .unwrap_or_default();
        if let Some(eq) = self.equipment.as_mut() {
            ids.extend(eq.take_all());
        }
        ids
    }

    /// Drop member ids rejected by `keep` from both inventory and equipment.
    pub fn prune_contents(&mut self, mut keep: impl FnMut(EntityId) -> bool) -> Vec<EntityId> {
        let mut dropped = self
            .inventory
            .as_mut()
            .map(|inv| inv.retain(&mut keep))
            .unwrap_or_default();
        if let Some(eq) = self.equipment.as_mut() {
            dropped.extend(eq.retain(&mut keep));
        }
        dropped
    }

    // --- update guard ---

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Enter the update hook. Returns false if an update is already running.
    pub fn begin_update(&mut self) -> bool {
        if self.busy {
            return false;
        }
        self.busy = true;
        true
    }

    pub fn end_update(&mut self) {
        self.busy = false;
    }

    // --- transient state ---

    pub fn transient(&self) -> &Transient {
        &self.transient
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.transient.session.as_ref()
    }

    pub fn attach_session(&mut self, session: SessionHandle) -> Option<SessionHandle> {
        self.transient.session.replace(session)
    }

    pub fn detach_session(&mut self) -> Option<SessionHandle> {
        self.transient.session.take()
    }

    pub fn subscribe(&mut self, watcher: EntityId) {
        self.transient.subscribers.insert(watcher);
    }

    pub fn subscribers(&self) -> &BTreeSet<EntityId> {
        &self.transient.subscribers
    }

    /// Rendered one-line description, cached until the next rehydrate or release.
    pub fn describe(&mut self) -> &str {
        if self.transient.description_cache.is_none() {
            let rendered = if self.description.is_empty() {
                self.name.clone()
            } else {
                format!("{}: {}", self.name, self.description)
            };
            self.transient.description_cache = Some(rendered);
        }
        self.transient.description_cache.as_deref().unwrap_or_default()
    }
}

impl From<&Entity> for EntityId {
    fn from(entity: &Entity) -> Self {
        entity.id
    }
}

impl Persistable for Entity {
    type Volatile = Transient;

    fn dehydrate(&mut self) -> Transient {
        tracing::trace!(id = %self.id.short(), "dehydrate");
        std::mem::take(&mut self.transient)
    }

    fn rehydrate(&mut self, volatile: Option<Transient>) {
        match volatile {
            Some(transient) => self.transient = transient,
            None => {
                self.transient = Transient::default();
                self.busy = false;
            }
        }
    }
}
