use realm_common::{EntityId, EntityKind};
use realm_entity::EquipSlot;
use realm_world::WorldManager;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::time::Duration;

/// Read-only queries over the loaded world for operators and debugging.
///
/// Nothing here demand-loads: the inspector reports what is in memory.
pub struct WorldInspector;

impl WorldInspector {
    pub fn summary(world: &WorldManager) -> WorldSummary {
        let registry = world.registry();
        WorldSummary {
            tick: world.tick_count(),
            now: world.now(),
            loaded: registry.count(),
            by_kind: registry.type_counts().clone(),
            online: world.online_players().count(),
            pending_actions: world.pending_actions(),
        }
    }

    pub fn inspect_entity(world: &WorldManager, id: EntityId) -> Option<EntityInfo> {
        let entity = world.registry().lookup(id)?;
        Some(EntityInfo {
            id,
            kind: entity.kind(),
            name: entity.name.clone(),
            container: entity.container(),
            inventory: entity
                .inventory()
                .map(|inv| inv.items().to_vec())
                .unwrap_or_default(),
            equipped: entity
                .equipment()
                .map(|eq| eq.iter().collect())
                .unwrap_or_default(),
            busy: entity.is_busy(),
            has_session: entity.session().is_some(),
        })
    }

    /// Loaded entity ids in registry order, optionally of one kind.
    pub fn list_entities(world: &WorldManager, kind: Option<EntityKind>) -> Vec<EntityId> {
        world
            .registry()
            .iter()
            .filter(|e| kind.is_none_or(|k| e.kind() == k))
            .map(|e| e.id())
            .collect()
    }

    /// Indented containment tree below `root`. Members that are not loaded are
    /// shown by id only.
    pub fn render_tree(world: &WorldManager, root: EntityId) -> String {
        let mut out = String::new();
        render_node(world, root, 0, None, &mut out);
        out
    }
}

fn render_node(
    world: &WorldManager,
    id: EntityId,
    depth: usize,
    slot: Option<EquipSlot>,
    out: &mut String,
) {
    let indent = "  ".repeat(depth);
    let worn = slot.map(|s| format!(" <{s}>")).unwrap_or_default();
    let Some(entity) = world.registry().lookup(id) else {
        let _ = writeln!(out, "{indent}[{}]{worn} (not loaded)", id.short());
        return;
    };
    let _ = writeln!(
        out,
        "{indent}[{}] {} ({}){worn}",
        id.short(),
        entity.name,
        entity.kind()
    );
    // Depth bound guards against a corrupted containment cycle.
    if depth >= 32 {
        return;
    }
    if let Some(inv) = entity.inventory() {
        for member in inv.items() {
            render_node(world, *member, depth + 1, None, out);
        }
    }
    if let Some(eq) = entity.equipment() {
        for (slot, member) in eq.iter() {
            render_node(world, member, depth + 1, Some(slot), out);
        }
    }
}

/// Summary of world state for the inspector.
#[derive(Debug, Clone)]
pub struct WorldSummary {
    pub tick: u64,
    pub now: Duration,
    pub loaded: usize,
    pub by_kind: BTreeMap<EntityKind, usize>,
    pub online: usize,
    pub pending_actions: usize,
}

impl fmt::Display for WorldSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "World: tick={} time={:.1}s loaded={} online={} pending_actions={}",
            self.tick,
            self.now.as_secs_f64(),
            self.loaded,
            self.online,
            self.pending_actions
        )?;
        for (kind, count) in &self.by_kind {
            write!(f, " {kind}={count}")?;
        }
        Ok(())
    }
}

/// Detailed info about a single loaded entity.
#[derive(Debug, Clone)]
pub struct EntityInfo {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    pub container: Option<EntityId>,
    pub inventory: Vec<EntityId>,
    pub equipped: Vec<(EquipSlot, EntityId)>,
    pub busy: bool,
    pub has_session: bool,
}

impl fmt::Display for EntityInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity [{}] {} ({})", self.id.short(), self.name, self.kind)?;
        match self.container {
            Some(c) => write!(f, " in [{}]", c.short())?,
            None => write!(f, " top-level")?,
        }
        write!(
            f,
            " items={} equipped={}",
            self.inventory.len(),
            self.equipped.len()
        )?;
        if self.busy {
            write!(f, " busy")?;
        }
        if self.has_session {
            write!(f, " connected")?;
        }
        Ok(())
    }
}
