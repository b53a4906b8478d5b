use std::ops::Deref;

/// Dehydrate/rehydrate contract for anything written to the store.
///
/// `dehydrate` moves every field that must not be encoded out of the value and
/// returns it as an opaque snapshot. `rehydrate(Some(_))` puts a snapshot back;
/// `rehydrate(None)` is called after a fresh decode and must install fresh
/// defaults, since a decoded record never carried transient state.
pub trait Persistable {
    type Volatile;

    fn dehydrate(&mut self) -> Self::Volatile;

    fn rehydrate(&mut self, volatile: Option<Self::Volatile>);
}

/// Scope guard holding a dehydrated value. Rehydrates on drop, so the value is
/// restored whether encoding succeeds, fails, or unwinds.
pub struct Dehydrated<'a, T: Persistable> {
    target: &'a mut T,
    volatile: Option<T::Volatile>,
}

impl<'a, T: Persistable> Dehydrated<'a, T> {
    pub fn new(target: &'a mut T) -> Self {
        let volatile = target.dehydrate();
        Self {
            target,
            volatile: Some(volatile),
        }
    }
}

impl<T: Persistable> Deref for Dehydrated<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.target
    }
}

impl<T: Persistable> Drop for Dehydrated<'_, T> {
    fn drop(&mut self) {
        let volatile = self.volatile.take();
        self.target.rehydrate(volatile);
    }
}
