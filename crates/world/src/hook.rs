use crate::action::Action;
use crate::error::WorldError;
use realm_entity::Entity;
use realm_kernel::ActionScheduler;
use std::time::Duration;

/// Per-entity behavior invoked once per tick for every loaded entity.
///
/// A hook only sees the entity being updated. Effects on other entities are
/// submitted as actions and run in the action phase of a later tick.
pub trait UpdateHook {
    fn name(&self) -> &str;

    fn update(&mut self, entity: &mut Entity, ctx: &mut HookContext<'_>) -> Result<(), WorldError>;
}

/// What a hook may touch besides its entity.
pub struct HookContext<'a> {
    pub(crate) tick: u64,
    pub(crate) now: Duration,
    pub(crate) scheduler: &'a mut ActionScheduler<Action>,
}

impl HookContext<'_> {
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulated time at the start of this tick.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn submit(&mut self, action: Action, priority: i32, delay: Option<Duration>) {
        self.scheduler.submit(action, priority, delay);
    }
}
