//! Synchronous publish/subscribe bus.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, error};

use super::types::{EventKind, JobEvent};

type Handler = Arc<dyn Fn(&JobEvent) + Send + Sync>;

struct Entry {
    id: u64,
    /// `None` subscribes to every kind.
    kind: Option<EventKind>,
    handler: Handler,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    entries: Vec<Entry>,
}

/// Delivers [`JobEvent`]s to registered handlers.
///
/// Delivery happens on the publishing thread, in subscription order. A
/// handler that panics is logged and skipped; the remaining handlers still
/// run. Handlers are invoked without the registry lock held, so they may
/// subscribe or unsubscribe themselves.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Inner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&JobEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(handler))
    }

    /// Registers `handler` for every event kind.
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&JobEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(handler))
    }

    fn register(&self, kind: Option<EventKind>, handler: Handler) -> Subscription {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push(Entry { id, kind, handler });
        debug!("Event subscription {} added for {:?}", id, kind);

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers `event` to every handler registered for its kind.
    pub fn publish(&self, event: &JobEvent) {
        let kind = event.kind();
        let handlers: Vec<(u64, Handler)> = self
            .lock()
            .entries
            .iter()
            .filter(|e| e.kind.is_none_or(|k| k == kind))
            .map(|e| (e.id, Arc::clone(&e.handler)))
            .collect();

        for (id, handler) in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!("Event handler {} panicked while handling {}", id, kind);
            }
        }
    }

    /// Drops every subscription.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        debug!("Cleared {} event subscriptions", count);
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().entries.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Handlers never run under the lock, so poisoning cannot leave the
        // registry half-updated
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Token returned by [`EventBus::subscribe`].
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    bus: Weak<Mutex<Inner>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the handler. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.bus.upgrade() else {
            return false;
        };
        let mut inner = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = inner.entries.len();
        inner.entries.retain(|e| e.id != self.id);
        inner.entries.len() != before
    }
}
