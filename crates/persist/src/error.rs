use realm_common::EntityId;

/// Errors from persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no such entity: {0}")]
    NoSuchEntity(EntityId),
    #[error("failed to load entity {id}: {reason}")]
    ObjectLoadError { id: EntityId, reason: String },
    #[error("unknown character: {0}")]
    UnknownCharacter(String),
    #[error("bad credential for character {0}")]
    BadCredential(String),
    #[error("corrupt index entry {partition}/{key}")]
    CorruptIndex { partition: String, key: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Failures that mean "this entity cannot be resolved" rather than
    /// "the store itself is broken". Ancestor and member resolution swallow these.
    pub fn is_unresolvable(&self) -> bool {
        matches!(self, Self::NoSuchEntity(_) | Self::ObjectLoadError { .. })
    }

    pub(crate) fn load(id: EntityId, reason: impl Into<String>) -> Self {
        Self::ObjectLoadError {
            id,
            reason: reason.into(),
        }
    }
}
