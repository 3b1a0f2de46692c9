use std::collections::VecDeque;

use bridge_core::model::BridgeEvent;

/// FIFO micro-batch buffer. Callers are responsible for serializing access
/// (the orchestrator does so by running `add`/`drain`/`requeue` from a
/// single dispatch task).
#[derive(Debug, Default)]
pub struct EventBuffer {
    batch_size: usize,
    items: VecDeque<BridgeEvent>,
}

impl EventBuffer {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            items: VecDeque::new(),
        }
    }

    /// Appends `event`, returning `true` if the buffer has reached its
    /// configured batch size and should be flushed immediately.
    pub fn add(&mut self, event: BridgeEvent) -> bool {
        self.items.push_back(event);
        self.items.len() >= self.batch_size
    }

    /// Drains and returns every buffered event, in FIFO order.
    pub fn drain(&mut self) -> Vec<BridgeEvent> {
        self.items.drain(..).collect()
    }

    /// Puts a previously-drained batch back at the head of the buffer,
    /// ahead of anything added since the failed flush.
    pub fn requeue(&mut self, events: Vec<BridgeEvent>) {
        for event in events.into_iter().rev() {
            self.items.push_front(event);
        }
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
