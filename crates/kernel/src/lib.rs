//! Kernel: the authoritative in-memory entity registry and the action
//! scheduler that orders every simulation effect.
//!
//! # Invariants
//! - At most one live instance per `EntityId`.
//! - Registry scan order is insertion order, so queries are reproducible.
//! - Scheduled actions pop in (priority, submission order); delayed actions
//!   never pop before their activation time.

pub mod registry;
pub mod scheduler;

pub use registry::EntityRegistry;
pub use scheduler::{ActionScheduler, Scheduled};

pub fn crate_info() -> &'static str {
    "realm-kernel v0.1.0"
}
