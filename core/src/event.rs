//! Synchronous multi-subscriber notification channels.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

/// A channel whose handlers run synchronously, in subscription order, at the
/// point `trigger` is called.
pub struct EventHook<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Default for EventHook<T> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }
}

impl<T> fmt::Debug for EventHook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len();
        f.debug_struct("EventHook").field("handlers", &count).finish()
    }
}

impl<T: 'static> EventHook<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler`; it stays registered until the returned
    /// subscription is turned off.
    pub fn on(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, Arc::new(handler)));

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription {
            off: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    registry
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .handlers
                        .retain(|(handler_id, _)| *handler_id != id);
                }
            })),
        }
    }

    /// Invokes every handler with `payload`.
    pub fn trigger(&self, payload: &T) {
        // Snapshot so handlers may subscribe or unsubscribe while running.
        let handlers: Vec<Handler<T>> = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(payload);
        }
    }
}

/// Handle returned by [`EventHook::on`].
///
/// Dropping it keeps the handler registered; call [`Subscription::off`] to
/// remove it.
pub struct Subscription {
    off: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn off(mut self) {
        if let Some(off) = self.off.take() {
            off();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
