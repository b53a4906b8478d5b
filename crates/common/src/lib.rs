//! Shared identifiers and type tags used by every realm crate.
//!
//! # Invariants
//! - An `EntityId` is assigned once and never changes.
//! - Every `EntityKind` maps to exactly one storage partition.

mod types;

pub use types::{EntityId, EntityKind, ParseKindError};

pub fn crate_info() -> &'static str {
    "realm-common v0.1.0"
}
