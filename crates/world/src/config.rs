use crate::error::WorldError;
use realm_common::EntityId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Runtime knobs for a [`WorldManager`](crate::WorldManager).
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Wall-clock length of one tick.
    pub tick_interval_ms: u64,
    /// Save every loaded entity after this many ticks. 0 disables autosave.
    pub autosave_every_ticks: u64,
    /// Run the idle eviction sweep after this many ticks. Off unless set.
    pub evict_every_ticks: Option<u64>,
    /// Well-known void location that orphaned entities end up in.
    pub fallback_id: EntityId,
    pub fallback_name: String,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            autosave_every_ticks: 600,
            evict_every_ticks: None,
            fallback_id: EntityId::nil(),
            fallback_name: "The Void".to_string(),
        }
    }
}

impl WorldConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, WorldError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        tracing::debug!(path = %path.as_ref().display(), ?config, "loaded world config");
        Ok(config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub(crate) fn autosave_due(&self, tick: u64) -> bool {
        self.autosave_every_ticks > 0 && tick % self.autosave_every_ticks == 0
    }

    pub(crate) fn eviction_due(&self, tick: u64) -> bool {
        self.evict_every_ticks.is_some_and(|n| n > 0 && tick % n == 0)
    }
}
