//! Entity model for the realm runtime.
//!
//! Entities are plain data owned by the registry. Relationships that cross the
//! persistence boundary (containment, inventory membership, equipment) are
//! expressed as ids and resolved through the registry, never as references.
//!
//! # Invariants
//! - `id` and `kind` are fixed at construction.
//! - A child's `container` always equals the id of the entity whose inventory
//!   or equipment lists it.
//! - Transient state never reaches the encoder: it is moved out by
//!   [`Persistable::dehydrate`] and restored on every exit path by the
//!   [`Dehydrated`] guard.

mod capability;
mod entity;
mod protocol;
mod transient;

pub use capability::{EquipSlot, Equipment, Inventory, InventoryError, Stats};
pub use entity::{Blueprint, Entity};
pub use protocol::{Dehydrated, Persistable};
pub use transient::{BufferedSession, Session, SessionHandle, Transient};

pub fn crate_info() -> &'static str {
    "realm-entity v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("entity"));
    }
}
