//! Synchronous fan-out of events to dynamically registered listeners.
//!
//! [`ListenerRegistry`] decouples event producers (the connection task) from
//! consumers (UI collaborators). Publishing iterates over a snapshot of the
//! listener list taken under the lock, so listeners may subscribe or
//! unsubscribe (themselves included) while an event is being dispatched.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Listener callback type stored by the registry.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slots<T> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener<T>)>>,
}

impl<T> Slots<T> {
    fn lock(&self) -> MutexGuard<'_, Vec<(u64, Listener<T>)>> {
        // A listener panic never happens under this lock, but recover anyway.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(slot, _)| *slot != id);
        entries.len() != before
    }
}

/// Ordered, thread-safe collection of listeners for events of type `T`.
///
/// Cloning the registry yields another handle to the same listener list.
pub struct ListenerRegistry<T> {
    slots: Arc<Slots<T>>,
}

impl<T> ListenerRegistry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Slots {
                next_id: AtomicU64::new(0),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Appends `listener` and returns the handle that removes it.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
        T: 'static,
    {
        let id = self.slots.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener<T> = Arc::new(listener);
        self.slots.lock().push((id, listener));

        let weak: Weak<Slots<T>> = Arc::downgrade(&self.slots);
        Unsubscribe::new(move || weak.upgrade().is_some_and(|slots| slots.remove(id)))
    }

    /// Delivers `event` to every listener in subscription order.
    ///
    /// A panicking listener is logged and skipped; delivery continues with
    /// the next one. Returns the number of listeners that returned normally.
    pub fn publish(&self, event: &T) -> usize {
        let snapshot: Vec<Listener<T>> = self
            .slots
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let mut delivered = 0;
        for listener in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::warn!("listener panicked; continuing fan-out"),
            }
        }
        delivered
    }

    /// Removes every listener. Handles returned earlier become no-ops.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns `true` if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl<T> Clone for ListenerRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ListenerRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Capability that removes exactly one listener.
///
/// Calling [`Unsubscribe::unsubscribe`] more than once, or after the
/// registry was cleared or dropped, does nothing. Dropping the handle does
/// *not* unsubscribe.
pub struct Unsubscribe {
    remove: Box<dyn Fn() -> bool + Send + Sync>,
}

impl Unsubscribe {
    fn new(remove: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            remove: Box::new(remove),
        }
    }

    /// Removes the listener. Returns `true` if it was still registered.
    pub fn unsubscribe(&self) -> bool {
        (self.remove)()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, ListenerRegistry<String>) {
        (Arc::new(Mutex::new(Vec::new())), ListenerRegistry::new())
    }

    fn seen(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().map(|v| v.clone()).unwrap_or_default()
    }

    #[test]
    fn publish_without_listeners_returns_zero() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        assert_eq!(registry.publish(&7), 0);
    }

    #[test]
    fn delivers_in_subscription_order() {
        let (log, registry) = recorder();
        for tag in ["a", "b", "c"] {
            let log = Arc::clone(&log);
            let _handle = registry.subscribe(move |event: &String| {
                if let Ok(mut v) = log.lock() {
                    v.push(format!("{tag}:{event}"));
                }
            });
        }

        assert_eq!(registry.publish(&"x".to_string()), 3);
        assert_eq!(seen(&log), vec!["a:x", "b:x", "c:x"]);
    }

    #[test]
    fn unsubscribed_listener_stops_receiving() {
        let (log, registry) = recorder();
        let log_a = Arc::clone(&log);
        let handle = registry.subscribe(move |e: &String| {
            if let Ok(mut v) = log_a.lock() {
                v.push(e.clone());
            }
        });

        registry.publish(&"first".to_string());
        assert!(handle.unsubscribe());
        registry.publish(&"second".to_string());

        assert_eq!(seen(&log), vec!["first"]);
    }

    #[test]
    fn unsubscribe_twice_is_noop() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let handle = registry.subscribe(|_| {});
        let _other = registry.subscribe(|_| {});
        assert!(handle.unsubscribe());
        assert!(!handle.unsubscribe());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn handles_become_noops_after_clear() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let handle = registry.subscribe(|_| {});
        registry.clear();
        assert!(registry.is_empty());
        assert!(!handle.unsubscribe());

        // Registry is reusable after clear.
        let _again = registry.subscribe(|_| {});
        assert_eq!(registry.len(), 1);
        assert!(!handle.unsubscribe());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn handle_outlives_registry() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let handle = registry.subscribe(|_| {});
        drop(registry);
        assert!(!handle.unsubscribe());
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = registry.subscribe(|_| panic!("listener failure"));
        let counter = Arc::clone(&hits);
        let _good = registry.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(registry.publish(&1), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_may_unsubscribe_itself_during_dispatch() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Unsubscribe>>> = Arc::new(Mutex::new(None));

        let counter = Arc::clone(&hits);
        let own = Arc::clone(&slot);
        let handle = registry.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Ok(guard) = own.lock()
                && let Some(h) = guard.as_ref()
            {
                h.unsubscribe();
            }
        });
        if let Ok(mut guard) = slot.lock() {
            *guard = Some(handle);
        }

        registry.publish(&1);
        registry.publish(&2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn clones_share_listeners() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let clone = registry.clone();
        let _handle = clone.subscribe(|_| {});
        assert_eq!(registry.len(), 1);
    }
}
