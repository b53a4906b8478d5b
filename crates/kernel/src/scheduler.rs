//! Dual-queue action scheduler.
//!
//! `pending` holds actions that may run now, ordered by priority; `future`
//! holds delayed actions ordered by absolute activation time. Both queues
//! break ties by a monotonically increasing submission sequence, so equal
//! priorities pop in the order they were submitted.
//!
//! The scheduler is not thread-safe. Submissions from other threads must be
//! marshaled onto the loop that owns it.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

/// An action popped from the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduled<A> {
    pub payload: A,
    pub priority: i32,
}

/// Heap entry ordered by `(key, seq)` only; the payload takes no part in ordering.
#[derive(Debug)]
struct Queued<K, A> {
    key: K,
    seq: u64,
    priority: i32,
    payload: A,
}

impl<K: Ord, A> PartialEq for Queued<K, A> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.seq == other.seq
    }
}

impl<K: Ord, A> Eq for Queued<K, A> {}

impl<K: Ord, A> PartialOrd for Queued<K, A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, A> Ord for Queued<K, A> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Priority/delay scheduler. Lower priority values dispatch first.
#[derive(Debug)]
pub struct ActionScheduler<A> {
    pending: BinaryHeap<Reverse<Queued<i32, A>>>,
    future: BinaryHeap<Reverse<Queued<Duration, A>>>,
    now: Duration,
    next_seq: u64,
}

impl<A> Default for ActionScheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> ActionScheduler<A> {
    pub fn new() -> Self {
        Self {
            pending: BinaryHeap::new(),
            future: BinaryHeap::new(),
            now: Duration::ZERO,
            next_seq: 0,
        }
    }

    /// Current scheduler time (elapsed world time).
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Move the clock forward. Time never goes backwards.
    pub fn advance_to(&mut self, now: Duration) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Queue `payload`. With no delay (or a zero delay) it is ready
    /// immediately; otherwise it becomes eligible at `now + delay`.
    pub fn submit(&mut self, payload: A, priority: i32, delay: Option<Duration>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        match delay.filter(|d| !d.is_zero()) {
            None => self.pending.push(Reverse(Queued {
                key: priority,
                seq,
                priority,
                payload,
            })),
            Some(delay) => {
                let activation = self.now.saturating_add(delay);
                tracing::trace!(?activation, priority, "deferred action");
                self.future.push(Reverse(Queued {
                    key: activation,
                    seq,
                    priority,
                    payload,
                }));
            }
        }
    }

    /// Promote every due delayed action, then pop the ready action with the
    /// smallest priority.
    pub fn pop_next(&mut self) -> Option<Scheduled<A>> {
        self.promote_due();
        let Reverse(entry) = self.pending.pop()?;
        Some(Scheduled {
            payload: entry.payload,
            priority: entry.priority,
        })
    }

    /// Pop every action that is runnable right now, in dispatch order.
    /// Actions submitted while the caller works through the batch wait for
    /// the next drain.
    pub fn drain_due(&mut self) -> Vec<Scheduled<A>> {
        let mut batch = Vec::with_capacity(self.pending.len());
        while let Some(next) = self.pop_next() {
            batch.push(next);
        }
        batch
    }

    /// Activation time of the earliest delayed action.
    pub fn next_activation(&self) -> Option<Duration> {
        self.future.peek().map(|Reverse(e)| e.key)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    pub fn len(&self) -> usize {
        self.pending.len() + self.future.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn promote_due(&mut self) {
        while self
            .future
            .peek()
            .is_some_and(|Reverse(entry)| entry.key <= self.now)
        {
            let Some(Reverse(entry)) = self.future.pop() else {
                break;
            };
            // Keep the original sequence so promoted actions stay stable
            // against ones submitted directly at the same priority.
            self.pending.push(Reverse(Queued {
                key: entry.priority,
                seq: entry.seq,
                priority: entry.priority,
                payload: entry.payload,
            }));
        }
    }
}
