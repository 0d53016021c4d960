//! Minimal observable cells used for URLs, payloads and the refetch flag.
//!
//! # Design
//! A `Signal` is a `tokio::sync::watch` sender behind an `Arc`: reads borrow
//! the current value and writers notify every receiver. Observers subscribe
//! explicitly and turn their receiver into a stream with [`changes`]; the
//! value current at subscription time is already marked as seen, so the
//! first tick is the first real change.

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;

/// A shared, observable value.
pub struct Signal<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self { tx: Arc::clone(&self.tx) }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signal").field(&*self.tx.borrow()).finish()
    }
}

impl<T> Signal<T> {
    pub fn new(value: T) -> Self {
        let (tx, _) = watch::channel(value);
        Self { tx: Arc::new(tx) }
    }

    /// Replaces the value, notifying subscribers only if it changed.
    pub fn set(&self, value: T)
    where
        T: PartialEq,
    {
        self.tx.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Mutates the value in place and notifies subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone> Signal<T> {
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }
}

/// Either a fixed value or a [`Signal`].
#[derive(Debug, Clone)]
pub enum MaybeSignal<T> {
    Static(T),
    Dynamic(Signal<T>),
}

impl<T: Clone> MaybeSignal<T> {
    pub fn get(&self) -> T {
        match self {
            MaybeSignal::Static(value) => value.clone(),
            MaybeSignal::Dynamic(signal) => signal.get(),
        }
    }
}

impl<T> MaybeSignal<T> {
    /// Subscribes to changes; `None` for static values, which never change.
    pub fn subscribe(&self) -> Option<watch::Receiver<T>> {
        match self {
            MaybeSignal::Static(_) => None,
            MaybeSignal::Dynamic(signal) => Some(signal.subscribe()),
        }
    }
}

impl<T: Default> Default for MaybeSignal<T> {
    fn default() -> Self {
        MaybeSignal::Static(T::default())
    }
}

impl<T> From<T> for MaybeSignal<T> {
    fn from(value: T) -> Self {
        MaybeSignal::Static(value)
    }
}

impl<T> From<Signal<T>> for MaybeSignal<T> {
    fn from(signal: Signal<T>) -> Self {
        MaybeSignal::Dynamic(signal)
    }
}

impl From<&str> for MaybeSignal<String> {
    fn from(value: &str) -> Self {
        MaybeSignal::Static(value.to_string())
    }
}

/// A stream yielding once per change observed by `rx`.
///
/// Ends when the sending side is dropped.
pub fn changes<T>(rx: watch::Receiver<T>) -> BoxStream<'static, ()>
where
    T: Send + Sync + 'static,
{
    stream::unfold(rx, |mut rx| async move {
        rx.changed().await.ok()?;
        Some(((), rx))
    })
    .boxed()
}
