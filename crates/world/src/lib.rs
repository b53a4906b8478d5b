//! World orchestration: entity and player lifecycle, the tick loop, periodic
//! saving and eviction.
//!
//! # Invariants
//! - The fallback location always exists once a [`WorldManager`] is built,
//!   as a top-level location that cannot be deleted, moved or equipped.
//! - Deleting an entity never deletes its contents; they are relocated to the
//!   fallback location.
//! - An action submitted during tick N runs no earlier than tick N+1.
//! - Persistence failures in background paths (autosave, eviction, logout)
//!   are logged and never abort the tick.

mod action;
mod config;
mod error;
mod events;
mod hook;
mod manager;

pub use action::Action;
pub use config::WorldConfig;
pub use error::WorldError;
pub use events::WorldEvent;
pub use hook::{HookContext, UpdateHook};
pub use manager::{TickReport, WorldManager};

pub fn crate_info() -> &'static str {
    "realm-world v0.1.0"
}
