//! Ordered listener lists with immediate deregistration.
//!
//! Each [`Listeners`] list fans one event kind out to its subscribers in
//! registration order. A panicking listener is logged and skipped; the
//! remaining listeners still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::lock;

pub const EVENT_MESSAGE_RECEIVED: &str = "message-received";
pub const EVENT_MESSAGE_SENT: &str = "message-sent";
pub const EVENT_CONVERSATION_HISTORY: &str = "conversation-history";
pub const EVENT_CONNECTION_STATE_CHANGED: &str = "connection-state-changed";
pub const EVENT_USER_REGISTERED: &str = "user-registered";

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback<T>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            active: self.active.clone(),
            callback: self.callback.clone(),
        }
    }
}

pub struct Listeners<T> {
    name: &'static str,
    next_id: AtomicU64,
    entries: Arc<Mutex<Vec<Entry<T>>>>,
}

impl<T: 'static> Listeners<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(0),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        lock(&self.entries).push(Entry {
            id,
            active: active.clone(),
            callback: Arc::new(callback),
        });

        let entries = Arc::downgrade(&self.entries);
        Subscription::new(move || {
            active.store(false, Ordering::SeqCst);
            if let Some(entries) = entries.upgrade() {
                lock(&entries).retain(|e| e.id != id);
            }
        })
    }

    /// Deliver `value` to every live listener, in registration order.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Entry<T>> = lock(&self.entries).clone();

        for entry in snapshot {
            // Deregistered by an earlier listener in this same round.
            if !entry.active.load(Ordering::SeqCst) {
                continue;
            }
            let callback = entry.callback;
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                tracing::error!(event = self.name, listener = entry.id, "Listener panicked");
            }
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by every `on_*` registration. Dropping it leaves the
/// listener registered; call [`Subscription::unsubscribe`] to remove it.
#[must_use = "dropping a Subscription keeps the listener registered"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
