//! Observer registry with disposer handles.
//!
//! Callbacks are held behind `Arc` and cloned out of the lock before being
//! invoked, so a callback may subscribe or unsubscribe without deadlocking.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slots<T> {
    next_id: u64,
    callbacks: BTreeMap<u64, Callback<T>>,
}

/// Set of callbacks notified with a shared payload.
pub struct SubscriberSet<T> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T: 'static> SubscriberSet<T> {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                next_id: 0,
                callbacks: BTreeMap::new(),
            })),
        }
    }

    /// Register a callback. It stays registered until the returned
    /// [`Subscription`] is cancelled or dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut slots = self.slots.lock();
            let id = slots.next_id;
            slots.next_id += 1;
            slots.callbacks.insert(id, Arc::new(callback));
            id
        };

        let weak: Weak<Mutex<Slots<T>>> = Arc::downgrade(&self.slots);
        Subscription::new(move || {
            if let Some(slots) = weak.upgrade() {
                slots.lock().callbacks.remove(&id);
            }
        })
    }

    /// Invoke every registered callback in registration order.
    pub fn notify(&self, payload: &T) {
        let callbacks: Vec<Callback<T>> = self.slots.lock().callbacks.values().cloned().collect();
        for callback in callbacks {
            callback(payload);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for SubscriberSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SubscriberSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberSet")
            .field("subscribers", &self.slots.lock().callbacks.len())
            .finish()
    }
}

/// Disposer returned by subscribe operations. Unsubscribes on drop.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// Unsubscribe now.
    pub fn cancel(mut self) {
        self.dispose_now();
    }

    fn dispose_now(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}
