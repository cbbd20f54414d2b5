//! Typed values coupled with a change condition.
//!
//! A [`Flag<T>`] stores a value and fires its [`Condition`] every time a new
//! value is committed. Proposed values first go through an acceptance test;
//! rejected values leave the flag untouched and fire nothing.
//!
//! The value is written before the condition fires, so any thread woken by the
//! condition already observes the new value.
//!
//! # Example
//!
//! ```
//! use walnut_core::Flag;
//!
//! let flag = Flag::new(1).with_acceptor(|v: &i32| *v >= 0);
//! assert!(flag.set(5));
//! assert!(!flag.set(-1));
//! assert_eq!(flag.get(), 5);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::condition::Condition;

/// Acceptance predicate of a flag.
pub type Acceptor<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// A value container whose condition fires on every accepted mutation.
pub struct Flag<T> {
    value: RwLock<T>,
    condition: Condition,
    changed: AtomicBool,
    acceptor: Option<Acceptor<T>>,
}

impl<T> Flag<T> {
    /// Create a flag with its own condition.
    pub fn new(value: T) -> Self {
        Self::with_condition(value, Condition::new())
    }

    /// Create a flag that fires a shared condition.
    ///
    /// Several flags may fire the same condition, which is how a module
    /// watches a whole set of values with one wait.
    pub fn with_condition(value: T, condition: Condition) -> Self {
        Self {
            value: RwLock::new(value),
            condition,
            changed: AtomicBool::new(false),
            acceptor: None,
        }
    }

    /// Install the acceptance predicate.
    pub fn with_acceptor<F>(mut self, acceptor: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.acceptor = Some(Box::new(acceptor));
        self
    }

    /// Access the current value by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.read())
    }

    /// Whether `value` would be accepted by [`set`](Self::set).
    pub fn accept(&self, value: &T) -> bool {
        self.acceptor.as_ref().is_none_or(|acceptor| acceptor(value))
    }

    /// Set a new value and fire the condition.
    ///
    /// Returns `false` and leaves everything unchanged if the value is rejected.
    pub fn set(&self, value: T) -> bool {
        if !self.accept(&value) {
            return false;
        }
        self.commit(value, true);
        true
    }

    /// Set a new value without firing the condition.
    pub fn set_silent(&self, value: T) -> bool {
        if !self.accept(&value) {
            return false;
        }
        self.commit(value, false);
        true
    }

    /// Store an already validated value.
    pub(crate) fn commit(&self, value: T, notify: bool) {
        *self.value.write() = value;
        self.changed.store(true, Ordering::SeqCst);
        if notify {
            self.condition.notify();
        }
    }

    /// Whether a value was committed since the last reset of the marker.
    pub fn changed(&self, reset: bool) -> bool {
        if reset {
            self.changed.swap(false, Ordering::SeqCst)
        } else {
            self.changed.load(Ordering::SeqCst)
        }
    }

    /// The condition fired on change.
    pub fn condition(&self) -> &Condition {
        &self.condition
    }
}

impl<T: Clone> Flag<T> {
    /// Get a copy of the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }
}

impl<T: PartialEq> Flag<T> {
    /// Block until the flag holds `expected`.
    pub fn wait_for_value(&self, expected: &T) {
        self.condition
            .wait_until(|| *self.value.read() == *expected);
    }
}

impl<T: Default> Default for Flag<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Flag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flag")
            .field("value", &*self.value.read())
            .field("changed", &self.changed.load(Ordering::Relaxed))
            .finish()
    }
}

static_assertions::assert_impl_all!(Flag<bool>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn counting(condition: &Condition) -> (Arc<AtomicUsize>, crate::Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let sub = condition.subscribe_signal(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (count, sub)
    }

    #[test]
    fn test_set_fires_condition() {
        let flag = Flag::new(0);
        let (fires, _sub) = counting(flag.condition());

        assert!(flag.set(3));
        assert_eq!(flag.get(), 3);
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejected_set_is_silent() {
        let flag = Flag::new(1).with_acceptor(|v: &i32| *v > 0);
        let (fires, _sub) = counting(flag.condition());

        assert!(!flag.accept(&0));
        assert!(!flag.set(0));
        assert_eq!(flag.get(), 1);
        assert_eq!(fires.load(Ordering::SeqCst), 0);
        assert!(!flag.changed(false));
    }

    #[test]
    fn test_set_silent() {
        let flag = Flag::new(String::from("a"));
        let (fires, _sub) = counting(flag.condition());

        assert!(flag.set_silent("b".into()));
        assert_eq!(flag.get(), "b");
        assert_eq!(fires.load(Ordering::SeqCst), 0);
        assert!(flag.changed(true));
        assert!(!flag.changed(false));
    }

    #[test]
    fn test_shared_condition() {
        let shared = Condition::new();
        let a = Flag::with_condition(0, shared.clone());
        let b = Flag::with_condition(false, shared.clone());
        let (fires, _sub) = counting(&shared);

        a.set(1);
        b.set(true);
        assert_eq!(fires.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_value_visible_to_woken_subscriber() {
        let flag = Arc::new(Flag::new(0));
        let seen = Arc::new(AtomicUsize::new(0));

        let flag_weak = Arc::downgrade(&flag);
        let seen_clone = seen.clone();
        let _sub = flag.condition().subscribe_signal(move || {
            if let Some(flag) = flag_weak.upgrade() {
                seen_clone.store(flag.get() as usize, Ordering::SeqCst);
            }
        });

        flag.set(42);
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_wait_for_value() {
        let flag = Arc::new(Flag::new(false));
        let waiter = {
            let flag = flag.clone();
            std::thread::spawn(move || flag.wait_for_value(&true))
        };
        flag.set(true);
        waiter.join().unwrap();
    }
}
