use realm_common::{EntityId, EntityKind};
use std::sync::mpsc::{self, Receiver, Sender};

/// Notifications published to independent subscribers, such as a handler
/// registration facility that attaches behavior to new entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    EntityAdded {
        id: EntityId,
        kind: EntityKind,
        container: Option<EntityId>,
    },
    EntityRemoved {
        id: EntityId,
        kind: EntityKind,
    },
    PlayerLoaded {
        id: EntityId,
        name: String,
    },
    PlayerDropped {
        id: EntityId,
        name: String,
    },
}

/// Fan-out of [`WorldEvent`]s. Subscribers whose receiver is gone are pruned
/// on the next publish.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Vec<Sender<WorldEvent>>,
}

impl EventBus {
    pub(crate) fn subscribe(&mut self) -> Receiver<WorldEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub(crate) fn publish(&mut self, event: WorldEvent) {
        tracing::trace!(?event, "publish");
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_every_event() {
        let mut bus = EventBus::default();
        let a = bus.subscribe();
        let b = bus.subscribe();
        let id = EntityId::new();
        bus.publish(WorldEvent::EntityRemoved {
            id,
            kind: EntityKind::Item,
        });

        for rx in [&a, &b] {
            assert_eq!(
                rx.try_recv().unwrap(),
                WorldEvent::EntityRemoved {
                    id,
                    kind: EntityKind::Item
                }
            );
        }
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let mut bus = EventBus::default();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        bus.publish(WorldEvent::PlayerDropped {
            id: EntityId::new(),
            name: "ann".into(),
        });
        assert_eq!(bus.subscriber_count(), 1);
        assert!(keep.try_recv().is_ok());
    }
}
