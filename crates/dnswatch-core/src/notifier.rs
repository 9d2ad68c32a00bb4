//! Listener fan-out shared by both monitors
//!
//! Dispatch copies the listener list before invoking anyone, so listeners
//! may add or remove subscribers (themselves included) while an event is
//! being delivered. Each invocation runs under `catch_unwind`: a panicking
//! listener is logged and skipped.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::error;

/// Ordered listener collection keyed by `K`
pub struct ChangeNotifier<K, L: ?Sized> {
    listeners: RwLock<Vec<(K, Arc<L>)>>,
}

impl<K, L> ChangeNotifier<K, L>
where
    K: PartialEq + Clone + std::fmt::Debug,
    L: ?Sized,
{
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener under `key`
    ///
    /// # Returns
    ///
    /// `false` if `key` was already registered (the existing registration is kept)
    pub fn add(&self, key: K, listener: Arc<L>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        if listeners.iter().any(|(existing, _)| *existing == key) {
            return false;
        }
        listeners.push((key, listener));
        true
    }

    /// Remove the listener registered under `key`
    pub fn remove(&self, key: &K) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| existing != key);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Invoke `deliver` on every listener in registration order
    ///
    /// # Returns
    ///
    /// Number of listeners that panicked
    pub fn dispatch<F>(&self, event: &str, deliver: F) -> usize
    where
        F: Fn(&L),
    {
        let snapshot: Vec<(K, Arc<L>)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut failures = 0;
        for (key, listener) in snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| deliver(listener.as_ref())));
            if let Err(payload) = outcome {
                failures += 1;
                error!(
                    "Listener {:?} panicked during {}: {}",
                    key,
                    event,
                    panic_message(payload.as_ref())
                );
            }
        }
        failures
    }
}

impl<K, L> Default for ChangeNotifier<K, L>
where
    K: PartialEq + Clone + std::fmt::Debug,
    L: ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Identity key of a shared listener: the address of its allocation
pub fn pointer_key<L: ?Sized>(listener: &Arc<L>) -> usize {
    Arc::as_ptr(listener) as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    trait Sink: Send + Sync {
        fn push(&self, value: u32);
    }

    struct Recorder(Mutex<Vec<u32>>);

    impl Sink for Recorder {
        fn push(&self, value: u32) {
            self.0.lock().unwrap().push(value);
        }
    }

    struct Exploder;

    impl Sink for Exploder {
        fn push(&self, _value: u32) {
            panic!("listener failure");
        }
    }

    #[test]
    fn duplicate_key_is_ignored() {
        let notifier: ChangeNotifier<usize, dyn Sink> = ChangeNotifier::new();
        let recorder: Arc<dyn Sink> = Arc::new(Recorder(Mutex::new(Vec::new())));
        assert!(notifier.add(pointer_key(&recorder), recorder.clone()));
        assert!(!notifier.add(pointer_key(&recorder), recorder.clone()));
        assert_eq!(notifier.len(), 1);
        assert!(notifier.remove(&pointer_key(&recorder)));
        assert!(notifier.is_empty());
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let notifier: ChangeNotifier<&'static str, dyn Sink> = ChangeNotifier::new();
        let first = Arc::new(Recorder(Mutex::new(Vec::new())));
        let last = Arc::new(Recorder(Mutex::new(Vec::new())));
        notifier.add("first", first.clone());
        notifier.add("exploder", Arc::new(Exploder));
        notifier.add("last", last.clone());

        let failures = notifier.dispatch("test", |sink| sink.push(7));

        assert_eq!(failures, 1);
        assert_eq!(*first.0.lock().unwrap(), vec![7]);
        assert_eq!(*last.0.lock().unwrap(), vec![7]);
    }

    #[test]
    fn listener_may_unsubscribe_during_dispatch() {
        let notifier: Arc<ChangeNotifier<&'static str, dyn Fn() + Send + Sync>> =
            Arc::new(ChangeNotifier::new());
        let weak = Arc::downgrade(&notifier);
        notifier.add(
            "self-removing",
            Arc::new(move || {
                if let Some(notifier) = weak.upgrade() {
                    notifier.remove(&"self-removing");
                }
            }),
        );

        assert_eq!(notifier.dispatch("test", |listener| listener()), 0);
        assert!(notifier.is_empty());
    }
}
