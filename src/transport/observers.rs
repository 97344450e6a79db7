//! Thread-safe observer lists.
//!
//! The transport surfaces its observations (events, unexpected errors,
//! unknown messages, log entries, raw data) through explicit subscriber
//! lists rather than ad-hoc callbacks. Observers are invoked on a defined
//! delivery context (a dispatcher worker or the connection read loop),
//! and emission happens outside the list lock, so an observer may
//! subscribe or unsubscribe from within a notification.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

// ============================================================================
// SubscriptionToken
// ============================================================================

/// Handle returned by [`ObserverList::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

// ============================================================================
// ObserverList
// ============================================================================

type Observer<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Ordered list of subscribers for one observation kind.
pub struct ObserverList<E: ?Sized> {
    next_token: AtomicU64,
    observers: Mutex<Vec<(SubscriptionToken, Observer<E>)>>,
}

impl<E: ?Sized> ObserverList<E> {
    /// Creates an empty observer list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_token: AtomicU64::new(0),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Adds an observer; returns a token for later removal.
    pub fn subscribe(&self, observer: impl Fn(&E) + Send + Sync + 'static) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((token, Arc::new(observer)));
        token
    }

    /// Removes the observer registered under `token`.
    ///
    /// Returns `false` if the token was already removed.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(registered, _)| *registered != token);
        observers.len() != before
    }

    /// Invokes every subscriber with the event, in subscription order.
    ///
    /// The list lock is released before any observer runs.
    pub fn emit(&self, event: &E) {
        let observers: Vec<Observer<E>> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer(event);
        }
    }

    /// Returns the number of subscribers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    /// Returns `true` if no observers are subscribed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.lock().is_empty()
    }
}

impl<E: ?Sized> Default for ObserverList<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
