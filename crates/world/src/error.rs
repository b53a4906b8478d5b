use realm_common::EntityId;
use realm_entity::InventoryError;
use realm_persist::StoreError;

/// Errors surfaced by world operations to the command layer.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error("character {0} is already logged in")]
    CharacterAlreadyLoaded(String),
    #[error("the name {0} is taken")]
    NameTaken(String),
    #[error("no such entity: {0}")]
    NoSuchEntity(EntityId),
    #[error("entity {0} is protected and cannot be deleted or moved")]
    Protected(EntityId),
    #[error("cannot place {item} inside {destination}")]
    InvalidMove {
        item: EntityId,
        destination: EntityId,
    },
    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),
}

impl WorldError {
    /// Authentication failures are shown to the connecting user; everything
    /// else is for the operator log.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::BadCredential(_) | StoreError::UnknownCharacter(_))
                | Self::CharacterAlreadyLoaded(_)
                | Self::NameTaken(_)
        )
    }
}
