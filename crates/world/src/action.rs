use crate::error::WorldError;
use crate::manager::WorldManager;
use std::fmt;

type Effect = Box<dyn FnOnce(&mut WorldManager) -> Result<(), WorldError>>;

/// A deferred simulation effect, run exactly once by the tick loop.
///
/// The label only exists for logs.
pub struct Action {
    label: String,
    effect: Effect,
}

impl Action {
    pub fn new(
        label: impl Into<String>,
        effect: impl FnOnce(&mut WorldManager) -> Result<(), WorldError> + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            effect: Box::new(effect),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn run(self, world: &mut WorldManager) -> Result<(), WorldError> {
        (self.effect)(world)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
