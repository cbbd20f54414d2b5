//! Thread-safe shared containers with scoped read/write tickets.
//!
//! [`SharedObject<T>`] wraps a value behind a reader-writer lock and only hands
//! out access through tickets. A [`ReadTicket`] grants shared access and any
//! number of them may coexist; a [`WriteTicket`] grants exclusive access and
//! fires the container's change condition when it is released. Tickets borrow
//! the container, so none can outlive it.
//!
//! [`SharedSequenceContainer`] and [`SharedAssociativeContainer`] are the
//! `Vec` and `BTreeMap` flavours with a few convenience helpers that take the
//! ticket internally.
//!
//! # Example
//!
//! ```
//! use walnut_core::SharedSequenceContainer;
//!
//! let list = SharedSequenceContainer::<i32>::default();
//! {
//!     let mut ticket = list.get_write_ticket();
//!     ticket.push(1);
//!     ticket.push(2);
//! } // change condition fires here
//!
//! let ticket = list.get_read_ticket();
//! assert_eq!(ticket.iter().sum::<i32>(), 3);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::condition::Condition;

/// A value shared between threads, accessed through tickets.
pub struct SharedObject<T> {
    data: RwLock<T>,
    change_condition: Condition,
}

/// A shared `Vec<T>`.
pub type SharedSequenceContainer<T> = SharedObject<Vec<T>>;

/// A shared, ordered `BTreeMap<K, V>`.
pub type SharedAssociativeContainer<K, V> = SharedObject<BTreeMap<K, V>>;

impl<T> SharedObject<T> {
    /// Wrap a value.
    pub fn new(value: T) -> Self {
        Self {
            data: RwLock::new(value),
            change_condition: Condition::new(),
        }
    }

    /// Acquire shared access. Blocks while a write ticket is held.
    pub fn get_read_ticket(&self) -> ReadTicket<'_, T> {
        ReadTicket {
            guard: self.data.read(),
        }
    }

    /// Acquire exclusive access. The change condition fires on release.
    pub fn get_write_ticket(&self) -> WriteTicket<'_, T> {
        WriteTicket {
            guard: self.data.write(),
            _notify: NotifyOnDrop(Some(&self.change_condition)),
        }
    }

    /// Acquire exclusive access without firing on release.
    pub fn get_write_ticket_silent(&self) -> WriteTicket<'_, T> {
        WriteTicket {
            guard: self.data.write(),
            _notify: NotifyOnDrop(None),
        }
    }

    /// Run a closure with shared access.
    pub fn with_read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.get_read_ticket())
    }

    /// Run a closure with exclusive access, then fire the change condition.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.get_write_ticket())
    }

    /// Condition fired whenever a (non-silent) write ticket is released.
    pub fn change_condition(&self) -> &Condition {
        &self.change_condition
    }
}

impl<T: Default> Default for SharedObject<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedObject")
            .field("data", &*self.get_read_ticket())
            .finish()
    }
}

/// Shared access to a [`SharedObject`].
pub struct ReadTicket<'a, T> {
    guard: RwLockReadGuard<'a, T>,
}

impl<T> ReadTicket<'_, T> {
    /// Release the ticket now.
    pub fn reset(self) {}
}

impl<T> Deref for ReadTicket<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

struct NotifyOnDrop<'a>(Option<&'a Condition>);

impl Drop for NotifyOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(condition) = self.0 {
            tracing::trace!(target: "walnut_core::shared", "write ticket released");
            condition.notify();
        }
    }
}

/// Exclusive access to a [`SharedObject`].
///
/// The lock is released before the change condition fires, so subscribers
/// may take a ticket of their own.
pub struct WriteTicket<'a, T> {
    // Declaration order matters: the guard drops before the notifier.
    guard: RwLockWriteGuard<'a, T>,
    _notify: NotifyOnDrop<'a>,
}

impl<T> WriteTicket<'_, T> {
    /// Release the ticket now.
    pub fn reset(self) {}
}

impl<T> Deref for WriteTicket<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for WriteTicket<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> SharedObject<Vec<T>> {
    /// Append an element.
    pub fn push(&self, value: T) {
        self.get_write_ticket().push(value);
    }

    /// Remove all elements matching `predicate`, returning how many were removed.
    ///
    /// Fires the change condition only if something was removed.
    pub fn remove_where(&self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let removed = {
            let mut ticket = self.get_write_ticket_silent();
            let before = ticket.len();
            ticket.retain(|item| !predicate(item));
            before - ticket.len()
        };
        if removed > 0 {
            self.change_condition.notify();
        }
        removed
    }

    /// Remove all elements.
    pub fn clear(&self) {
        self.get_write_ticket().clear();
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.get_read_ticket().len()
    }

    /// Whether the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.get_read_ticket().is_empty()
    }
}

impl<T: Clone> SharedObject<Vec<T>> {
    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<T> {
        self.get_read_ticket().clone()
    }
}

impl<K: Ord, V> SharedObject<BTreeMap<K, V>> {
    /// Insert a value, returning the previous one for this key.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.get_write_ticket().insert(key, value)
    }

    /// Remove a key, returning its value.
    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.get_write_ticket_silent().remove(key);
        if removed.is_some() {
            self.change_condition.notify();
        }
        removed
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get_read_ticket().contains_key(key)
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.get_write_ticket().clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.get_read_ticket().len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.get_read_ticket().is_empty()
    }
}

impl<K: Ord, V: Clone> SharedObject<BTreeMap<K, V>> {
    /// Copy of the value stored under `key`.
    pub fn get_cloned(&self, key: &K) -> Option<V> {
        self.get_read_ticket().get(key).cloned()
    }
}

static_assertions::assert_impl_all!(SharedObject<Vec<u32>>: Send, Sync);
