//! Multi-subscriber callbacks.
//!
//! A [`Signal`] is the push side of Walnut's notification machinery. Every
//! [`Condition`](crate::Condition) owns a `Signal<()>` for its subscribers;
//! connectors announce connections with `Signal<(String, String)>` and modules
//! report readiness and failures the same way.
//!
//! Slots run synchronously on the thread calling [`Signal::emit`]. There is no
//! event loop behind a signal. Work that belongs on another thread should wait
//! on a condition and re-read state when woken, so slots stay short and never
//! block.
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use walnut_core::Signal;
//!
//! let crashed = Signal::<String>::new();
//! let count = Arc::new(AtomicUsize::new(0));
//!
//! let seen = count.clone();
//! let id = crashed.connect(move |reason| {
//!     assert_eq!(reason, "out of memory");
//!     seen.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! crashed.emit("out of memory".to_string());
//! crashed.disconnect(id);
//! crashed.emit("ignored".to_string());
//! assert_eq!(count.load(Ordering::SeqCst), 1);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// Handle of one connected slot, valid until that slot is disconnected.
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

struct Slots<Args> {
    table: Mutex<SlotMap<ConnectionId, Slot<Args>>>,
    blocked: AtomicBool,
}

impl<Args> Slots<Args> {
    fn remove(&self, id: ConnectionId) -> bool {
        self.table.lock().remove(id).is_some()
    }

    /// Clones of the connected slots, taken so that no lock is held while
    /// they run.
    fn snapshot(&self) -> Vec<Slot<Args>> {
        self.table.lock().values().cloned().collect()
    }
}

/// A list of callbacks invoked with `&Args` on every [`emit`](Self::emit).
///
/// Use `()` for plain notifications and a tuple for several values.
pub struct Signal<Args> {
    slots: Arc<Slots<Args>>,
}

impl<Args: 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: 'static> Signal<Args> {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Slots {
                table: Mutex::new(SlotMap::with_key()),
                blocked: AtomicBool::new(false),
            }),
        }
    }

    /// Add a slot. It stays connected until [`disconnect`](Self::disconnect)
    /// is called with the returned id.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.slots.table.lock().insert(Arc::new(slot))
    }

    /// Add a slot that is removed when the returned guard is dropped.
    ///
    /// The guard does not keep the signal alive.
    pub fn connect_scoped<F>(&self, slot: F) -> ConnectionGuard
    where
        F: Fn(&Args) + Send + Sync + 'static,
        Args: Send,
    {
        let id = self.connect(slot);
        let slots: Weak<Slots<Args>> = Arc::downgrade(&self.slots);
        let owner: Weak<dyn SlotOwner> = slots;
        ConnectionGuard {
            owner: Some(owner),
            id,
        }
    }

    /// Remove one slot. Returns `false` if it was already gone.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.slots.remove(id)
    }

    pub fn disconnect_all(&self) {
        self.slots.table.lock().clear();
    }

    pub fn connection_count(&self) -> usize {
        self.slots.table.lock().len()
    }

    /// Suppress or resume emission. A blocked signal drops emits silently.
    pub fn set_blocked(&self, blocked: bool) {
        self.slots.blocked.store(blocked, Ordering::SeqCst);
    }

    pub fn is_blocked(&self) -> bool {
        self.slots.blocked.load(Ordering::SeqCst)
    }

    /// Run every connected slot on the calling thread.
    ///
    /// Slots connected or disconnected by a running slot take effect from the
    /// next emit on.
    #[tracing::instrument(skip_all, target = "walnut_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        if self.is_blocked() {
            tracing::trace!(target: targets::SIGNAL, "blocked");
            return;
        }
        let slots = self.slots.snapshot();
        tracing::trace!(target: targets::SIGNAL, slots = slots.len(), "emit");
        for slot in &slots {
            slot(&args);
        }
    }
}

impl<Args> fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("slots", &self.slots.table.lock().len())
            .field("blocked", &self.slots.blocked.load(Ordering::Relaxed))
            .finish()
    }
}

/// Lets a guard remove its slot without knowing the argument type.
trait SlotOwner: Send + Sync {
    fn release(&self, id: ConnectionId) -> bool;
}

impl<Args: Send> SlotOwner for Slots<Args> {
    fn release(&self, id: ConnectionId) -> bool {
        self.remove(id)
    }
}

/// Owns one connection and removes it on drop.
///
/// Returned by [`Signal::connect_scoped`] and, as
/// [`Subscription`](crate::Subscription), by
/// [`Condition::subscribe_signal`](crate::Condition::subscribe_signal).
pub struct ConnectionGuard {
    owner: Option<Weak<dyn SlotOwner>>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remove the slot now. Later calls, and the drop, do nothing.
    pub fn disconnect(&mut self) {
        if let Some(owner) = self.owner.take().and_then(|weak| weak.upgrade()) {
            owner.release(self.id);
        }
    }

    /// Whether the slot is still owned by this guard.
    pub fn is_active(&self) -> bool {
        self.owner
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionGuard")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

static_assertions::assert_impl_all!(Signal<()>: Send, Sync);
static_assertions::assert_impl_all!(Signal<(String, String)>: Send, Sync);
static_assertions::assert_impl_all!(ConnectionGuard: Send, Sync);
