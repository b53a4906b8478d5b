//! Persistence: partitioned entity storage, recursive object-graph load/store,
//! player credentials, and the demand-loading registry cache.
//!
//! Logical layout:
//! ```text
//! entities/     id -> kind              (routing partition)
//! <kind>/       id -> encoded entity    (room, item, creature, player)
//! players/      lowercase name -> id
//! credentials/  id -> salted hash
//! ```
//!
//! # Invariants
//! - Every store access is serialized through one lock.
//! - Transient entity state is never encoded, and is restored on every exit
//!   path of a store operation.
//! - Dangling containment is resolved lazily to the fallback location, never
//!   treated as fatal.

mod backend;
mod cache;
mod codec;
mod credentials;
mod error;
mod store;

pub use backend::{Backend, FileBackend, MemoryBackend};
pub use cache::{CachingEntityRegistry, EvictionSummary};
pub use codec::RECORD_SCHEMA_VERSION;
pub use credentials::CredentialHash;
pub use error::StoreError;
pub use store::{
    CREDENTIALS_PARTITION, LoadSummary, PLAYERS_PARTITION, PersistentStore, ROUTING_PARTITION,
    SaveSummary,
};

pub fn crate_info() -> &'static str {
    "realm-persist v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("persist"));
    }
}
