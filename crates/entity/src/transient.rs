use realm_common::EntityId;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A live connection bound to an entity. Implemented by the wire layer.
pub trait Session: fmt::Debug + Send + Sync {
    /// Queue text for delivery to the client.
    fn send(&self, text: &str);
    /// Terminate the connection. Must be safe to call more than once.
    fn close(&self);
    fn is_open(&self) -> bool;
}

pub type SessionHandle = Arc<dyn Session>;

/// Fields that exist only while an entity is live and are never persisted.
#[derive(Debug, Clone, Default)]
pub struct Transient {
    pub session: Option<SessionHandle>,
    /// Entities that want to hear about this one (followers, watchers).
    pub subscribers: BTreeSet<EntityId>,
    pub description_cache: Option<String>,
}

impl Transient {
    pub fn is_empty(&self) -> bool {
        self.session.is_none() && self.subscribers.is_empty() && self.description_cache.is_none()
    }
}

/// In-process session that buffers output. Used by the CLI and by tests
/// in place of a network connection.
#[derive(Debug, Default)]
pub struct BufferedSession {
    lines: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl BufferedSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take everything sent so far.
    pub fn drain(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(mut lines) => std::mem::take(&mut *lines),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Session for BufferedSession {
    fn send(&self, text: &str) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(text.to_string());
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}
