//! Typed property variables.

use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use glam::DVec3;
use parking_lot::RwLock;

use super::constraint::{ConstraintKind, MaxConstraint, MinConstraint, PropertyConstraint};
use super::types::{
    Color, PropertyType, PropertyValue, PropertyVariant, Selection, TransferFunction, Trigger,
};
use super::{Property, PropertyInfo, PropertyOptions};
use crate::condition::{Condition, Subscription};
use crate::flag::Flag;

/// A property holding a value of type `T`.
///
/// Wraps a [`Flag<T>`] and an ordered list of [`PropertyConstraint`]s guarded
/// by their own reader-writer lock. `set` commits only if every constraint
/// accepts the value; otherwise nothing changes and nothing fires.
pub struct PropertyVariable<T: PropertyValue> {
    info: PropertyInfo,
    flag: Flag<T>,
    constraints: RwLock<Vec<Arc<dyn PropertyConstraint<T>>>>,
    _notifier: Option<Subscription>,
}

pub type PropInt = Arc<PropertyVariable<i32>>;
pub type PropDouble = Arc<PropertyVariable<f64>>;
pub type PropBool = Arc<PropertyVariable<bool>>;
pub type PropString = Arc<PropertyVariable<String>>;
pub type PropFilename = Arc<PropertyVariable<PathBuf>>;
pub type PropSelection = Arc<PropertyVariable<Selection>>;
pub type PropPosition = Arc<PropertyVariable<DVec3>>;
pub type PropColor = Arc<PropertyVariable<Color>>;
pub type PropTrigger = Arc<PropertyVariable<Trigger>>;
pub type PropTransferFunction = Arc<PropertyVariable<TransferFunction>>;

impl<T: PropertyValue> PropertyVariable<T> {
    /// Create a standalone property with its own condition.
    pub fn new(name: impl Into<String>, description: impl Into<String>, initial: T) -> Self {
        Self::with_options(name, description, initial, PropertyOptions::default())
    }

    /// Create a property with a shared condition, a notifier, or other options.
    pub fn with_options(
        name: impl Into<String>,
        description: impl Into<String>,
        initial: T,
        options: PropertyOptions,
    ) -> Self {
        let info = PropertyInfo::new(name, description);
        info.set_hidden(options.hide);
        info.set_purpose(options.purpose);
        let flag = Flag::with_condition(initial, options.condition.unwrap_or_default());
        let notifier = options
            .notifier
            .map(|notifier| flag.condition().subscribe_signal(move || notifier()));
        Self {
            info,
            flag,
            constraints: RwLock::new(Vec::new()),
            _notifier: notifier,
        }
    }

    /// The current value. Never blocks on other properties, never fails.
    pub fn get(&self) -> T {
        self.flag.get()
    }

    /// Access the current value by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.flag.with(f)
    }

    /// Whether `value` passes the flag's test and every constraint.
    pub fn accept(&self, value: &T) -> bool {
        if !self.flag.accept(value) {
            return false;
        }
        // Constraints may inspect the property, so the lock is not held while
        // they run.
        let constraints = self.constraints.read().clone();
        constraints
            .iter()
            .all(|constraint| constraint.accept(self, value))
    }

    /// Validate and commit a value, firing the update condition.
    ///
    /// Returns `false` without side effects if the value is rejected.
    #[tracing::instrument(skip_all, target = "walnut_core::property", level = "trace", fields(name = %self.info.name()))]
    pub fn set(&self, value: T) -> bool {
        if !self.accept(&value) {
            tracing::debug!(target: "walnut_core::property", name = %self.info.name(), ?value, "value rejected");
            return false;
        }
        self.flag.commit(value, true);
        true
    }

    /// Validate and commit a value without firing the update condition.
    pub fn set_silent(&self, value: T) -> bool {
        if !self.accept(&value) {
            return false;
        }
        self.flag.commit(value, false);
        true
    }

    /// Whether a value was committed since the marker was last reset.
    pub fn changed(&self, reset: bool) -> bool {
        self.flag.changed(reset)
    }

    /// Get the value and reset the change marker.
    pub fn get_and_reset(&self) -> T {
        self.flag.changed(true);
        self.flag.get()
    }

    /// The underlying flag.
    pub fn flag(&self) -> &Flag<T> {
        &self.flag
    }

    /// Attach a constraint. Attaching the same instance twice has no effect.
    pub fn add_constraint(&self, constraint: Arc<dyn PropertyConstraint<T>>) {
        let mut constraints = self.constraints.write();
        if !constraints.iter().any(|c| Arc::ptr_eq(c, &constraint)) {
            constraints.push(constraint);
        }
    }

    /// Remove every constraint of the given kind.
    pub fn remove_constraints(&self, kind: ConstraintKind) {
        self.constraints.write().retain(|c| c.kind() != kind);
    }

    /// Remove one specific constraint instance.
    pub fn remove_constraint(&self, constraint: &Arc<dyn PropertyConstraint<T>>) {
        self.constraints
            .write()
            .retain(|c| !Arc::ptr_eq(c, constraint));
    }

    /// The first attached constraint of the given kind.
    pub fn get_first_constraint(&self, kind: ConstraintKind) -> Option<Arc<dyn PropertyConstraint<T>>> {
        self.constraints
            .read()
            .iter()
            .find(|c| c.kind() == kind)
            .cloned()
    }

    /// Number of attached constraints of the given kind.
    pub fn count_constraints(&self, kind: ConstraintKind) -> usize {
        self.constraints
            .read()
            .iter()
            .filter(|c| c.kind() == kind)
            .count()
    }

    /// Build a detached copy with a fresh flag and condition.
    fn duplicate(&self) -> Self {
        Self {
            info: self.info.duplicate(),
            flag: Flag::new(self.flag.get()),
            constraints: RwLock::new(self.constraints.read().clone()),
            _notifier: None,
        }
    }
}

impl<T: PropertyValue + PartialOrd> PropertyVariable<T> {
    /// Replace any lower bound with `min`.
    pub fn set_min(&self, min: T) -> Arc<MinConstraint<T>> {
        let constraint = Arc::new(MinConstraint::new(min));
        let mut constraints = self.constraints.write();
        constraints.retain(|c| c.kind() != ConstraintKind::Min);
        constraints.push(constraint.clone());
        constraint
    }

    /// Replace any upper bound with `max`.
    pub fn set_max(&self, max: T) -> Arc<MaxConstraint<T>> {
        let constraint = Arc::new(MaxConstraint::new(max));
        let mut constraints = self.constraints.write();
        constraints.retain(|c| c.kind() != ConstraintKind::Max);
        constraints.push(constraint.clone());
        constraint
    }

    /// The current lower bound, if any.
    pub fn get_min(&self) -> Option<T> {
        let constraint = self.get_first_constraint(ConstraintKind::Min)?;
        constraint
            .as_any()
            .downcast_ref::<MinConstraint<T>>()
            .map(|c| c.min().clone())
    }

    /// The current upper bound, if any.
    pub fn get_max(&self) -> Option<T> {
        let constraint = self.get_first_constraint(ConstraintKind::Max)?;
        constraint
            .as_any()
            .downcast_ref::<MaxConstraint<T>>()
            .map(|c| c.max().clone())
    }
}

impl<T: PropertyValue> Property for PropertyVariable<T> {
    fn info(&self) -> &PropertyInfo {
        &self.info
    }

    fn property_type(&self) -> PropertyType {
        T::PROPERTY_TYPE
    }

    fn update_condition(&self) -> &Condition {
        self.flag.condition()
    }

    fn get_as_string(&self) -> String {
        self.flag.with(T::to_property_string)
    }

    fn set_as_string(&self, value: &str) -> bool {
        match self.flag.with(|current| T::from_property_string(value, current)) {
            Some(parsed) => self.set(parsed),
            None => {
                tracing::debug!(target: "walnut_core::property", name = %self.info.name(), value, "unparsable value");
                false
            }
        }
    }

    fn get_variant(&self) -> Option<PropertyVariant> {
        Some(self.get().into_variant())
    }

    fn set_variant(&self, value: PropertyVariant) -> bool {
        T::from_variant(value).is_some_and(|value| self.set(value))
    }

    fn set_from(&self, other: &dyn Property) -> bool {
        match other.as_any().downcast_ref::<PropertyVariable<T>>() {
            Some(other) => self.set(other.get()),
            None => false,
        }
    }

    fn clone_property(&self) -> Arc<dyn Property> {
        Arc::new(self.duplicate())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T: PropertyValue> fmt::Debug for PropertyVariable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyVariable")
            .field("name", &self.info.name())
            .field("type", &T::PROPERTY_TYPE)
            .field("value", &self.get())
            .field("constraints", &self.constraints.read().len())
            .finish()
    }
}

static_assertions::assert_impl_all!(PropertyVariable<i32>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{ConstraintFn, NotEmptyConstraint};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn count_fires(condition: &Condition) -> (Arc<AtomicUsize>, Subscription) {
        let fires = Arc::new(AtomicUsize::new(0));
        let fires_clone = fires.clone();
        let sub = condition.subscribe_signal(move || {
            fires_clone.fetch_add(1, Ordering::SeqCst);
        });
        (fires, sub)
    }

    #[test]
    fn test_set_and_get() {
        let prop = PropertyVariable::new("x", "desc", 5);
        assert_eq!(prop.get(), 5);
        assert!(prop.set(8));
        assert_eq!(prop.get(), 8);
        assert_eq!(prop.property_type(), PropertyType::Int);
        assert_eq!(prop.name(), "x");
        assert_eq!(prop.description(), "desc");
    }

    #[test]
    fn test_rejected_set_leaves_state_and_does_not_fire() {
        let prop = PropertyVariable::new("x", "", 5);
        prop.set_min(0);
        prop.set_max(10);
        let (fires, _sub) = count_fires(prop.update_condition());

        assert!(!prop.accept(&11));
        assert!(!prop.set(11));
        assert!(!prop.set(-1));
        assert!(!prop.set_as_string("42"));
        assert_eq!(prop.get(), 5);
        assert_eq!(fires.load(Ordering::SeqCst), 0);

        assert!(prop.set(10));
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_min_replaces_previous_min() {
        let prop = PropertyVariable::new("x", "", 5);
        prop.set_min(0);
        assert!(prop.accept(&2));

        prop.set_min(3);
        assert_eq!(prop.count_constraints(ConstraintKind::Min), 1);
        assert_eq!(prop.get_min(), Some(3));
        assert!(!prop.accept(&2));

        prop.set_min(1);
        assert!(prop.accept(&2));
        assert_eq!(prop.get_max(), None);
    }

    #[test]
    fn test_unrelated_kinds_coexist() {
        let prop = PropertyVariable::new("s", "", String::from("b"));
        prop.add_constraint(Arc::new(NotEmptyConstraint));
        prop.set_min(String::from("a"));

        assert!(!prop.set(String::new()));
        assert!(prop.set(String::from("c")));
        assert_eq!(prop.count_constraints(ConstraintKind::NotEmpty), 1);
        assert_eq!(prop.count_constraints(ConstraintKind::Min), 1);
    }

    #[test]
    fn test_constraint_dedup_and_removal() {
        let prop = PropertyVariable::new("x", "", 0);
        let odd: Arc<dyn PropertyConstraint<i32>> = Arc::new(ConstraintFn::new(|v: &i32| v % 2 != 0));
        let small: Arc<dyn PropertyConstraint<i32>> = Arc::new(ConstraintFn::new(|v: &i32| *v < 100));
        prop.add_constraint(odd.clone());
        prop.add_constraint(odd.clone());
        prop.add_constraint(small.clone());
        assert_eq!(prop.count_constraints(ConstraintKind::Custom), 2);

        assert!(!prop.set(2));
        assert!(prop.set(3));

        prop.remove_constraint(&odd);
        assert!(prop.set(4));
        assert!(prop.get_first_constraint(ConstraintKind::Custom).is_some());
        prop.remove_constraints(ConstraintKind::Custom);
        assert!(prop.get_first_constraint(ConstraintKind::Custom).is_none());
    }

    #[test]
    fn test_string_access() {
        let prop = PropertyVariable::new("pos", "", DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(prop.get_as_string(), "1;2;3");
        assert!(prop.set_as_string("4;5.5;6"));
        assert_eq!(prop.get(), DVec3::new(4.0, 5.5, 6.0));
        assert!(!prop.set_as_string("nonsense"));
        assert_eq!(prop.get(), DVec3::new(4.0, 5.5, 6.0));
    }

    #[test]
    fn test_variant_access() {
        let prop = PropertyVariable::new("b", "", false);
        assert_eq!(prop.get_variant(), Some(PropertyVariant::Bool(false)));
        assert!(prop.set_variant(PropertyVariant::Bool(true)));
        assert!(!prop.set_variant(PropertyVariant::Int(1)));
        assert!(prop.get());
    }

    #[test]
    fn test_set_from_checks_type() {
        let a = PropertyVariable::new("a", "", 1.5f64);
        let b = PropertyVariable::new("b", "", 4.0f64);
        let c = PropertyVariable::new("c", "", 9i32);

        assert!(a.set_from(&b));
        assert_eq!(a.get(), 4.0);
        assert!(!a.set_from(&c));
        assert_eq!(a.get(), 4.0);
    }

    #[test]
    fn test_clone_is_decoupled() {
        let original = PropertyVariable::new("x", "", 1);
        original.set_max(5);
        let (original_fires, _a) = count_fires(original.update_condition());

        let cloned = original.clone_property();
        let cloned_var = cloned.as_any().downcast_ref::<PropertyVariable<i32>>().unwrap();
        let (clone_fires, _b) = count_fires(cloned.update_condition());

        assert!(!original.update_condition().ptr_eq(cloned.update_condition()));
        assert_eq!(cloned_var.get(), 1);
        assert_eq!(cloned_var.get_max(), Some(5));

        original.update_condition().notify();
        assert_eq!(clone_fires.load(Ordering::SeqCst), 0);

        cloned_var.set(2);
        assert_eq!(original_fires.load(Ordering::SeqCst), 1);
        assert_eq!(clone_fires.load(Ordering::SeqCst), 1);
        assert_eq!(original.get(), 1);
    }

    #[test]
    fn test_notifier_and_shared_condition() {
        let shared = Condition::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let prop = PropertyVariable::with_options(
            "t",
            "",
            Trigger::Ready,
            PropertyOptions::new().condition(shared.clone()).notifier(move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(prop.update_condition().ptr_eq(&shared));
        prop.set(Trigger::Triggered);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(prop.changed(false));
        assert_eq!(prop.get_and_reset(), Trigger::Triggered);
        assert!(!prop.changed(false));
    }
}
