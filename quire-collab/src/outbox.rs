//! Outgoing messages held while the link is not open.
//!
//! Messages are replayed in order once the transport reports `Opened`.

use std::collections::VecDeque;

use crate::protocol::SyncMessage;

pub struct Outbox {
    queue: VecDeque<SyncMessage>,
    max_size: usize,
}

impl Outbox {
    /// Create a new outbox with max capacity.
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Queue a message for later replay. Returns `false` when full.
    pub fn enqueue(&mut self, msg: SyncMessage) -> bool {
        if self.queue.len() >= self.max_size {
            return false;
        }
        self.queue.push_back(msg);
        true
    }

    /// Drain all queued messages, oldest first.
    pub fn drain(&mut self) -> Vec<SyncMessage> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Total payload bytes queued.
    pub fn total_bytes(&self) -> usize {
        self.queue.iter().map(|m| m.payload.len()).sum()
    }
}
