use realm_common::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Errors from placing entities into inventories or equipment slots.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    #[error("inventory of {container} is full (capacity {capacity})")]
    InventoryFull { container: EntityId, capacity: usize },
    #[error("slot {slot} of {wearer} is already occupied by {occupant}")]
    SlotOccupied {
        wearer: EntityId,
        slot: EquipSlot,
        occupant: EntityId,
    },
    #[error("entity {0} cannot hold other entities")]
    NoInventory(EntityId),
    #[error("entity {0} cannot equip items")]
    NoEquipment(EntityId),
}

/// Ordered list of contained entity ids with an optional capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    items: Vec<EntityId>,
    capacity: Option<usize>,
}

impl Inventory {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            items: Vec::new(),
            capacity,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Add an item, respecting capacity. Re-inserting a present item is a no-op.
    pub fn insert(&mut self, owner: EntityId, item: EntityId) -> Result<(), InventoryError> {
        if self.contains(item) {
            return Ok(());
        }
        if let Some(capacity) = self.capacity {
            if self.items.len() >= capacity {
                return Err(InventoryError::InventoryFull {
                    container: owner,
                    capacity,
                });
            }
        }
        self.items.push(item);
        Ok(())
    }

    /// Add an item ignoring capacity. Used when relocating orphans.
    pub fn force_insert(&mut self, item: EntityId) {
        if !self.contains(item) {
            self.items.push(item);
        }
    }

    pub fn remove(&mut self, item: EntityId) -> bool {
        let before = self.items.len();
        self.items.retain(|i| *i != item);
        self.items.len() != before
    }

    pub fn contains(&self, item: EntityId) -> bool {
        self.items.contains(&item)
    }

    pub fn items(&self) -> &[EntityId] {
        &self.items
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every listed id for which `keep` is false. Returns the dropped ids.
    pub fn retain(&mut self, mut keep: impl FnMut(EntityId) -> bool) -> Vec<EntityId> {
        let mut dropped = Vec::new();
        self.items.retain(|id| {
            let k = keep(*id);
            if !k {
                dropped.push(*id);
            }
            k
        });
        dropped
    }

    pub(crate) fn take_all(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.items)
    }
}

/// Equipment slots a creature or player can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipSlot {
    Head,
    Body,
    Hands,
    Feet,
    MainHand,
    OffHand,
}

impl fmt::Display for EquipSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Head => "head",
            Self::Body => "body",
            Self::Hands => "hands",
            Self::Feet => "feet",
            Self::MainHand => "main_hand",
            Self::OffHand => "off_hand",
        };
        f.write_str(name)
    }
}

/// Slot → equipped entity id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    slots: BTreeMap<EquipSlot, EntityId>,
}

impl Equipment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equip(
        &mut self,
        wearer: EntityId,
        slot: EquipSlot,
        item: EntityId,
    ) -> Result<(), InventoryError> {
        match self.slots.get(&slot) {
            Some(occupant) if *occupant == item => Ok(()),
            Some(occupant) => Err(InventoryError::SlotOccupied {
                wearer,
                slot,
                occupant: *occupant,
            }),
            None => {
                self.slots.insert(slot, item);
                Ok(())
            }
        }
    }

    pub fn unequip(&mut self, slot: EquipSlot) -> Option<EntityId> {
        self.slots.remove(&slot)
    }

    /// Remove `item` from whichever slot holds it.
    pub fn remove_item(&mut self, item: EntityId) -> bool {
        match self.slot_of(item) {
            Some(slot) => self.slots.remove(&slot).is_some(),
            None => false,
        }
    }

    pub fn slot_of(&self, item: EntityId) -> Option<EquipSlot> {
        self.slots
            .iter()
            .find(|(_, id)| **id == item)
            .map(|(slot, _)| *slot)
    }

    pub fn get(&self, slot: EquipSlot) -> Option<EntityId> {
        self.slots.get(&slot).copied()
    }

    /// Equipped ids in slot order.
    pub fn items(&self) -> Vec<EntityId> {
        self.slots.values().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EquipSlot, EntityId)> + '_ {
        self.slots.iter().map(|(slot, id)| (*slot, *id))
    }

    pub fn retain(&mut self, mut keep: impl FnMut(EntityId) -> bool) -> Vec<EntityId> {
        let dropped: Vec<EntityId> = self.slots.values().copied().filter(|id| !keep(*id)).collect();
        self.slots.retain(|_, id| !dropped.contains(id));
        dropped
    }

    pub(crate) fn take_all(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.slots).into_values().collect()
    }
}

/// Basic vital statistics for living entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub health: i32,
    pub max_health: i32,
    pub level: u32,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            health: 10,
            max_health: 10,
            level: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_respects_capacity() {
        let owner = EntityId::new();
        let mut inv = Inventory::new(Some(1));
        inv.insert(owner, EntityId::new()).unwrap();
        let err = inv.insert(owner, EntityId::new()).unwrap_err();
        assert_eq!(
            err,
            InventoryError::InventoryFull {
                container: owner,
                capacity: 1
            }
        );
    }

    #[test]
    fn inventory_insert_is_idempotent() {
        let owner = EntityId::new();
        let item = EntityId::new();
        let mut inv = Inventory::new(Some(1));
        inv.insert(owner, item).unwrap();
        inv.insert(owner, item).unwrap();
        assert_eq!(inv.len(), 1);
    }

    #[test]
    fn force_insert_ignores_capacity() {
        let mut inv = Inventory::new(Some(0));
        inv.force_insert(EntityId::new());
        assert_eq!(inv.len(), 1);
    }

    #[test]
    fn equip_rejects_occupied_slot() {
        let wearer = EntityId::new();
        let helm = EntityId::new();
        let hat = EntityId::new();
        let mut eq = Equipment::new();
        eq.equip(wearer, EquipSlot::Head, helm).unwrap();
        match eq.equip(wearer, EquipSlot::Head, hat) {
            Err(InventoryError::SlotOccupied { occupant, .. }) => assert_eq!(occupant, helm),
            other => panic!("expected SlotOccupied, got {other:?}"),
        }
        assert_eq!(eq.unequip(EquipSlot::Head), Some(helm));
        eq.equip(wearer, EquipSlot::Head, hat).unwrap();
        assert_eq!(eq.slot_of(hat), Some(EquipSlot::Head));
    }

    #[test]
    fn retain_reports_dropped_ids() {
        let keep = EntityId::new();
        let gone = EntityId::new();
        let mut eq = Equipment::new();
        eq.equip(EntityId::new(), EquipSlot::Body, keep).unwrap();
        eq.equip(EntityId::new(), EquipSlot::Feet, gone).unwrap();
        let dropped = eq.retain(|id| id == keep);
        assert_eq!(dropped, vec![gone]);
        assert_eq!(eq.items(), vec![keep]);
    }
}
