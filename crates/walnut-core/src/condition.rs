//! Waitable conditions and condition sets.
//!
//! A [`Condition`] is the notification primitive everything else is built on.
//! Firing a condition wakes every thread currently blocked in
//! [`Condition::wait`] and calls every subscribed callback exactly once. No
//! payload travels with the notification: whoever wakes up re-reads the state
//! it is interested in.
//!
//! A [`ConditionSet`] is a logical OR over several conditions. Module threads
//! block on a set composed of their shutdown flag, their input connectors and
//! the properties they watch, so a single `wait()` covers all of them.
//!
//! # Firing Semantics
//!
//! Every condition carries a generation counter that is bumped under the
//! condition's lock on each fire. A waiter records the generation it saw when it
//! started waiting and sleeps until it changes, so a fire that happens after
//! `wait()` was entered is never lost and spurious wake-ups are filtered out.
//!
//! Callbacks run on the firing thread after the lock has been released. They
//! must be short and must not block.
//!
//! # Example
//!
//! ```
//! use walnut_core::Condition;
//!
//! let condition = Condition::new();
//! let waiter = {
//!     let condition = condition.clone();
//!     std::thread::spawn(move || condition.wait_until(|| true))
//! };
//! condition.notify();
//! waiter.join().unwrap();
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};

use crate::signal::{ConnectionGuard, Signal};

/// RAII handle for a callback subscribed to a [`Condition`].
///
/// Holds only a weak reference to the condition. Dropping the handle (or
/// calling [`disconnect`](ConnectionGuard::disconnect)) removes the callback;
/// both are idempotent and safe after the condition is gone.
pub type Subscription = ConnectionGuard;

#[derive(Debug, Default)]
struct ConditionState {
    /// Bumped on every fire.
    generation: u64,
    /// Sticky "has fired" memory, used by one-shot conditions and resetable sets.
    fired: bool,
}

struct ConditionInner {
    state: Mutex<ConditionState>,
    cvar: Condvar,
    callbacks: Signal<()>,
    one_shot: bool,
}

impl ConditionInner {
    fn new(one_shot: bool) -> Self {
        Self {
            state: Mutex::new(ConditionState::default()),
            cvar: Condvar::new(),
            callbacks: Signal::new(),
            one_shot,
        }
    }

    /// Block until the generation moves on.
    ///
    /// With `sticky`, an already remembered fire satisfies the wait at once.
    /// With `auto_reset`, the memory is cleared when the wait returns.
    fn wait_with(&self, sticky: bool, auto_reset: bool) {
        let mut state = self.state.lock();
        if !(sticky && state.fired) {
            let generation = state.generation;
            while state.generation == generation {
                self.cvar.wait(&mut state);
            }
        }
        if sticky && auto_reset {
            state.fired = false;
        }
    }

    fn wait_since(&self, generation: u64) {
        let mut state = self.state.lock();
        while state.generation == generation {
            self.cvar.wait(&mut state);
        }
    }

    fn notify(&self) {
        {
            let mut state = self.state.lock();
            state.generation = state.generation.wrapping_add(1);
            state.fired = true;
            self.cvar.notify_all();
        }
        self.callbacks.emit(());
    }
}

/// A waitable synchronization object with callback subscriptions.
///
/// `Condition` is a cheap, cloneable handle: clones refer to the same
/// underlying condition. Use [`Condition::ptr_eq`] to compare identity.
///
/// A plain condition is resetable: every `wait()` blocks until the next fire.
/// A [one-shot](Self::one_shot) condition remembers that it fired and lets all
/// later waits through until [`reset`](Self::reset) is called.
#[derive(Clone)]
pub struct Condition {
    inner: Arc<ConditionInner>,
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

impl Condition {
    /// Create a new resetable condition.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ConditionInner::new(false)),
        }
    }

    /// Create a one-shot condition.
    ///
    /// Once fired, every subsequent [`wait`](Self::wait) returns immediately.
    pub fn one_shot() -> Self {
        Self {
            inner: Arc::new(ConditionInner::new(true)),
        }
    }

    /// Whether this is a one-shot condition.
    pub fn is_one_shot(&self) -> bool {
        self.inner.one_shot
    }

    /// Block the calling thread until the condition fires.
    #[tracing::instrument(skip_all, target = "walnut_core::condition", level = "trace")]
    pub fn wait(&self) {
        self.inner.wait_with(self.inner.one_shot, false);
    }

    /// Fire the condition: wake all waiters, then call all subscribers.
    pub fn notify(&self) {
        tracing::trace!(target: "walnut_core::condition", "condition fired");
        self.inner.notify();
    }

    /// Clear the "has fired" memory of a one-shot condition.
    pub fn reset(&self) {
        self.inner.state.lock().fired = false;
    }

    /// Whether the condition has fired since creation or the last `reset`.
    pub fn has_fired(&self) -> bool {
        self.inner.state.lock().fired
    }

    /// The current fire generation.
    ///
    /// Pair with [`wait_since`](Self::wait_since) to wait for a fire that
    /// happens after a point observed earlier.
    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    /// Block until the generation differs from `generation`.
    ///
    /// Returns immediately if the condition fired after `generation` was read.
    pub fn wait_since(&self, generation: u64) {
        self.inner.wait_since(generation);
    }

    /// Block until `predicate` returns `true`.
    ///
    /// The predicate is evaluated once up front and again after every fire.
    /// A fire that happens while the predicate is being evaluated is not lost.
    pub fn wait_until<F>(&self, mut predicate: F)
    where
        F: FnMut() -> bool,
    {
        loop {
            let generation = self.generation();
            if predicate() {
                return;
            }
            self.wait_since(generation);
        }
    }

    /// Subscribe a callback that is invoked on every fire.
    ///
    /// The callback runs on the firing thread. Keep the returned
    /// [`Subscription`] alive for as long as the callback should stay connected.
    #[must_use = "dropping the subscription disconnects the callback"]
    pub fn subscribe_signal<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.callbacks.connect_scoped(move |_| callback())
    }

    /// Number of currently subscribed callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.inner.callbacks.connection_count()
    }

    /// Whether two handles refer to the same condition.
    pub fn ptr_eq(&self, other: &Condition) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Create a weak handle that does not keep the condition alive.
    pub fn downgrade(&self) -> WeakCondition {
        WeakCondition {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Condition")
            .field("one_shot", &self.inner.one_shot)
            .field("generation", &state.generation)
            .field("fired", &state.fired)
            .finish()
    }
}

/// Weak handle to a [`Condition`].
#[derive(Clone)]
pub struct WeakCondition {
    inner: Weak<ConditionInner>,
}

impl WeakCondition {
    /// Upgrade to a strong handle if the condition still exists.
    pub fn upgrade(&self) -> Option<Condition> {
        self.inner.upgrade().map(|inner| Condition { inner })
    }

    /// Fire the condition if it still exists.
    pub fn notify(&self) {
        if let Some(condition) = self.upgrade() {
            condition.notify();
        }
    }
}

impl fmt::Debug for WeakCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakCondition")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// A condition that fires whenever any of its members fires.
///
/// The set is itself a condition: it can be waited on, subscribed to and added
/// to other sets via [`as_condition`](Self::as_condition).
///
/// # Resetable Sets
///
/// A [resetable](Self::set_resetable) set remembers that one of its members
/// fired. `wait()` then returns immediately instead of blocking, which closes
/// the window in which a module thread is busy working and would otherwise
/// miss a notification. With `auto_reset`, the memory is cleared each time
/// `wait()` returns; without it, call [`reset`](Self::reset) explicitly.
pub struct ConditionSet {
    condition: Condition,
    members: Mutex<Vec<(Condition, Subscription)>>,
    resetable: AtomicBool,
    auto_reset: AtomicBool,
}

impl Default for ConditionSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionSet {
    /// Create an empty, non-resetable set.
    pub fn new() -> Self {
        Self {
            condition: Condition::new(),
            members: Mutex::new(Vec::new()),
            resetable: AtomicBool::new(false),
            auto_reset: AtomicBool::new(false),
        }
    }

    /// Add a member. Adding the same condition twice has no effect.
    pub fn add(&self, condition: &Condition) {
        let mut members = self.members.lock();
        if members.iter().any(|(member, _)| member.ptr_eq(condition)) {
            return;
        }
        let target = self.condition.downgrade();
        let subscription = condition.subscribe_signal(move || target.notify());
        members.push((condition.clone(), subscription));
    }

    /// Remove a member. Removing a condition that is not a member is a no-op.
    pub fn remove(&self, condition: &Condition) {
        // Dropping the subscription outside the member lock.
        let removed: Vec<_> = {
            let mut members = self.members.lock();
            let (removed, kept) = members
                .drain(..)
                .partition(|(member, _)| member.ptr_eq(condition));
            *members = kept;
            removed
        };
        drop(removed);
    }

    /// Whether `condition` is a member of this set.
    pub fn contains(&self, condition: &Condition) -> bool {
        self.members
            .lock()
            .iter()
            .any(|(member, _)| member.ptr_eq(condition))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    /// Configure the "has fired" memory.
    pub fn set_resetable(&self, resetable: bool, auto_reset: bool) {
        self.resetable.store(resetable, Ordering::SeqCst);
        self.auto_reset.store(auto_reset, Ordering::SeqCst);
    }

    /// Whether the set remembers fires.
    pub fn is_resetable(&self) -> bool {
        self.resetable.load(Ordering::SeqCst)
    }

    /// Clear the "has fired" memory.
    pub fn reset(&self) {
        self.condition.reset();
    }

    /// Block until any member fires (or, for resetable sets, has fired).
    #[tracing::instrument(skip_all, target = "walnut_core::condition", level = "trace")]
    pub fn wait(&self) {
        let resetable = self.resetable.load(Ordering::SeqCst);
        let auto_reset = self.auto_reset.load(Ordering::SeqCst);
        self.condition.inner.wait_with(resetable, auto_reset);
    }

    /// Fire the set directly, as if a member had fired.
    pub fn notify(&self) {
        self.condition.notify();
    }

    /// Subscribe to fires of any member.
    #[must_use = "dropping the subscription disconnects the callback"]
    pub fn subscribe_signal<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.condition.subscribe_signal(callback)
    }

    /// The aggregate condition fired by this set.
    pub fn as_condition(&self) -> &Condition {
        &self.condition
    }
}

impl fmt::Debug for ConditionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionSet")
            .field("members", &self.len())
            .field("resetable", &self.is_resetable())
            .finish()
    }
}

static_assertions::assert_impl_all!(Condition: Send, Sync);
static_assertions::assert_impl_all!(ConditionSet: Send, Sync);
