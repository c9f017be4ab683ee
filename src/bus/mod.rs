//! SubscriptionBus - typed fan-out of state changes
//!
//! Observers (UI renderers, loggers, the IPC layer) register a callback and
//! receive every event published while they are registered. Nothing is
//! buffered: a late subscriber does not see historical events, it is expected
//! to pull a snapshot first (`SessionManager::get_sessions`).
//!
//! Rules:
//! - listeners run strictly in subscription order
//! - a failing or panicking listener is logged and skipped
//! - the listener list lock is NOT held while callbacks run, so a listener may
//!   subscribe / unsubscribe / publish from inside its callback

mod sequencer;

pub use sequencer::EventSequencer;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

/// Error a listener can return to signal it could not handle an event
#[derive(Debug, Clone, thiserror::Error)]
#[error("Listener failed: {0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Opaque identity of a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

type Listener<E> = Arc<dyn Fn(&E) -> Result<(), ListenerError> + Send + Sync>;

/// Listener registry with ordered, isolated delivery
pub struct SubscriptionBus<E> {
    /// Registered listeners in subscription order
    listeners: RwLock<Vec<(SubscriptionHandle, Listener<E>)>>,
    /// Handle id generator
    next_id: AtomicU64,
}

impl<E> SubscriptionBus<E> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener; it receives every event published from now on
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionHandle
    where
        F: Fn(&E) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push((handle, Arc::new(listener)));
        debug!("SubscriptionBus: listener {} subscribed", handle.0);
        handle
    }

    /// Remove a listener. Returns false if the handle was not registered.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(h, _)| *h != handle);
        let removed = listeners.len() < before;
        if removed {
            debug!("SubscriptionBus: listener {} unsubscribed", handle.0);
        }
        removed
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver `event` to every listener registered at call time.
    ///
    /// Never fails: listener errors and panics are logged.
    pub fn publish(&self, event: &E) {
        // Snapshot so callbacks can touch the bus without deadlocking
        let snapshot: Vec<(SubscriptionHandle, Listener<E>)> = self.listeners.read().clone();

        for (handle, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("SubscriptionBus: listener {} returned error: {}", handle.0, e);
                }
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    warn!("SubscriptionBus: listener {} panicked: {}", handle.0, msg);
                }
            }
        }
    }
}

impl<E> Default for SubscriptionBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_publish_in_subscription_order() {
        let bus = SubscriptionBus::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            bus.subscribe(move |v: &u32| {
                seen.lock().push(format!("{}{}", tag, v));
                Ok(())
            });
        }

        bus.publish(&1);
        assert_eq!(*seen.lock(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn test_failing_listener_does_not_stop_others() {
        let bus = SubscriptionBus::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(|_| Err(ListenerError::new("render failed")));
        bus.subscribe(|_| panic!("listener blew up"));
        let s = seen.clone();
        bus.subscribe(move |v| {
            s.lock().push(*v);
            Ok(())
        });

        bus.publish(&7);
        bus.publish(&8);
        assert_eq!(*seen.lock(), vec![7, 8]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = SubscriptionBus::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        let handle = bus.subscribe(move |v| {
            s.lock().push(*v);
            Ok(())
        });

        bus.publish(&1);
        assert!(bus.unsubscribe(handle));
        assert!(!bus.unsubscribe(handle));
        bus.publish(&2);

        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_new_listener_gets_no_history() {
        let bus = SubscriptionBus::<u32>::new();
        bus.publish(&1);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.subscribe(move |v| {
            s.lock().push(*v);
            Ok(())
        });
        bus.publish(&2);

        assert_eq!(*seen.lock(), vec![2]);
    }

    #[test]
    fn test_listener_can_reenter_bus() {
        let bus = Arc::new(SubscriptionBus::<u32>::new());
        let weak = Arc::downgrade(&bus);

        bus.subscribe(move |_| {
            if let Some(bus) = weak.upgrade() {
                bus.subscribe(|_| Ok(()));
            }
            Ok(())
        });

        bus.publish(&1);
        assert_eq!(bus.listener_count(), 2);
    }

    #[test]
    fn test_handles_are_unique() {
        let bus = SubscriptionBus::<u32>::new();
        let h1 = bus.subscribe(|_| Ok(()));
        let h2 = bus.subscribe(|_| Ok(()));
        assert_ne!(h1, h2);
        assert!(h1.id() < h2.id());
    }
}
