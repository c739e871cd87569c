use std::collections::VecDeque;
use std::sync::Mutex;

use hubchat_shared::PendingMessage;

use crate::lock;

/// Outbound messages waiting for a live connection, in submission order.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    entries: Mutex<VecDeque<PendingMessage>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append and return the new length.
    pub fn push(&self, message: PendingMessage) -> usize {
        let mut entries = lock(&self.entries);
        entries.push_back(message);
        entries.len()
    }

    /// Take every entry, leaving the queue empty.
    pub fn drain(&self) -> Vec<PendingMessage> {
        lock(&self.entries).drain(..).collect()
    }

    pub fn snapshot(&self) -> Vec<PendingMessage> {
        lock(&self.entries).iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
