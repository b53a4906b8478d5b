use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Globally unique identifier for an entity (GOID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// A fresh random id. Uniqueness against live and persisted entities is
    /// checked by the allocator, not here.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero id, used as the default well-known fallback location.
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Type tag of an entity. Selects the storage partition and the capability
/// set an entity is constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Room,
    Item,
    Creature,
    Player,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [Self::Room, Self::Item, Self::Creature, Self::Player];

    /// Name of the storage partition holding encoded entities of this kind.
    pub fn partition(&self) -> &'static str {
        match self {
            Self::Room => "room",
            Self::Item => "item",
            Self::Creature => "creature",
            Self::Player => "player",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.partition())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown entity kind: {0}")]
pub struct ParseKindError(pub String);

impl FromStr for EntityKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.partition() == s)
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}
