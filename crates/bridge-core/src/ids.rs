use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};

use uuid::Uuid;

/// Generates a fresh event id for events that have no upstream id to inherit.
pub fn generate_event_id() -> String {
    format!("evt_{}", Uuid::new_v4().simple())
}

/// Monotonically increasing local sequence counter, shared by every event
/// the bridge emits that has no inherited `seq` from the gateway.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicI64);

impl SequenceCounter {
    pub fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Bounded set of recently-seen event ids, used as a client-side backstop
/// against re-ingesting the same event after an overlapping resync.
///
/// See the gap-resync idempotence decision in the design ledger.
#[derive(Debug)]
pub struct RecentIdGuard {
    capacity: usize,
    order: VecDeque<String>,
    seen: std::collections::HashSet<String>,
}

impl RecentIdGuard {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: std::collections::HashSet::with_capacity(capacity),
        }
    }

    /// Records `id`, returning `true` if it had not been seen before.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(id.to_owned());
        self.seen.insert(id.to_owned());
        true
    }
}
