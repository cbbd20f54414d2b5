//! Typed, constrainable, observable properties.
//!
//! Every configurable parameter of a module is a property. Properties come in
//! a closed set of value types (see [`PropertyValue`]) and are all reachable
//! through the object-safe [`Property`] trait, which offers type-erased access
//! by string or by [`PropertyVariant`]. Concrete access goes through
//! [`PropertyVariable<T>`], obtained either when the property is created or by
//! downcasting with [`PropertyExt::downcast`].
//!
//! Properties are organized in [`PropertyGroup`]s, which form a hierarchical
//! namespace (`"group/sub/name"`) and fire an aggregate condition whenever any
//! member changes.
//!
//! # Example
//!
//! ```
//! use walnut_core::property::{PropertyGroup, PropertyExt};
//!
//! let root = PropertyGroup::new("root", "");
//! let x = root.add_property("x", "an integer", 5).unwrap();
//! x.set_min(0);
//! x.set_max(10);
//!
//! assert!(!x.set(15));
//! assert_eq!(x.get(), 5);
//! assert!(x.set(7));
//!
//! let found = root.get_property("x").unwrap().downcast::<i32>().unwrap();
//! assert_eq!(found.get(), 7);
//! ```

mod constraint;
mod group;
mod object;
mod types;
mod variable;

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::condition::Condition;

pub use constraint::{
    ConstraintFn, ConstraintKind, Emptiness, IsDirectoryConstraint, IsFileConstraint,
    MaxConstraint, MinConstraint, NotEmptyConstraint, PathExistsConstraint, PropertyConstraint,
    SelectAtLeastOneConstraint, SelectOnlyOneConstraint,
};
pub use group::{PATH_SEPARATOR, PropertyGroup};
pub use object::{PropertyObject, PropertyObjectValue};
pub use types::{
    AlphaPoint, Color, ColorPoint, PropertyPurpose, PropertyType, PropertyValue, PropertyVariant,
    Selection, SelectionItem, TransferFunction, Trigger,
};
pub use variable::{
    PropBool, PropColor, PropDouble, PropFilename, PropInt, PropPosition, PropSelection,
    PropString, PropTransferFunction, PropTrigger, PropertyVariable,
};

/// Callback invoked whenever a property changes.
pub type Notifier = Arc<dyn Fn() + Send + Sync>;

/// Metadata shared by every property.
#[derive(Debug)]
pub struct PropertyInfo {
    name: String,
    description: String,
    purpose: RwLock<PropertyPurpose>,
    hidden: AtomicBool,
    attached: AtomicBool,
}

impl PropertyInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            purpose: RwLock::new(PropertyPurpose::default()),
            hidden: AtomicBool::new(false),
            attached: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn purpose(&self) -> PropertyPurpose {
        *self.purpose.read()
    }

    pub fn set_purpose(&self, purpose: PropertyPurpose) {
        *self.purpose.write() = purpose;
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::SeqCst)
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.hidden.store(hidden, Ordering::SeqCst);
    }

    /// Whether the property currently belongs to a group.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Claim membership. Fails if another group already owns the property.
    pub(crate) fn attach(&self) -> bool {
        self.attached
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    /// Metadata copy for a cloned property: same name, description, purpose
    /// and visibility, but not attached anywhere.
    pub(crate) fn duplicate(&self) -> Self {
        let copy = Self::new(self.name.clone(), self.description.clone());
        copy.set_purpose(self.purpose());
        copy.set_hidden(self.is_hidden());
        copy
    }
}

/// Creation options for properties added to a group.
#[derive(Clone, Default)]
pub struct PropertyOptions {
    /// Fire this (possibly shared) condition instead of a fresh one.
    pub condition: Option<Condition>,
    /// Callback subscribed to the property's condition for its lifetime.
    pub notifier: Option<Notifier>,
    /// Create the property hidden.
    pub hide: bool,
    /// Purpose of the property.
    pub purpose: PropertyPurpose,
}

impl PropertyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn notifier<F>(mut self, notifier: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    pub fn hidden(mut self, hide: bool) -> Self {
        self.hide = hide;
        self
    }

    pub fn purpose(mut self, purpose: PropertyPurpose) -> Self {
        self.purpose = purpose;
        self
    }
}

impl fmt::Debug for PropertyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyOptions")
            .field("condition", &self.condition.is_some())
            .field("notifier", &self.notifier.is_some())
            .field("hide", &self.hide)
            .field("purpose", &self.purpose)
            .finish()
    }
}

/// The common, type-erased interface of all properties.
pub trait Property: Send + Sync + fmt::Debug + 'static {
    /// Name, description and flags.
    fn info(&self) -> &PropertyInfo;

    /// Runtime type tag.
    fn property_type(&self) -> PropertyType;

    /// Condition fired whenever the property changes.
    fn update_condition(&self) -> &Condition;

    /// Canonical string form of the current value.
    fn get_as_string(&self) -> String;

    /// Parse and set a value. Returns `false` if parsing or validation fails.
    fn set_as_string(&self, value: &str) -> bool;

    /// The current value as variant. `None` for groups and object properties.
    fn get_variant(&self) -> Option<PropertyVariant>;

    /// Set from a variant. Returns `false` on kind mismatch or rejection.
    fn set_variant(&self, value: PropertyVariant) -> bool;

    /// Copy the value of another property of the same concrete type.
    ///
    /// Returns `false` if the types differ or the value is rejected.
    fn set_from(&self, other: &dyn Property) -> bool;

    /// Deep copy with fresh conditions. Subscriptions are not carried over.
    fn clone_property(&self) -> Arc<dyn Property>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// This property as group, if it is one.
    fn as_group(&self) -> Option<&PropertyGroup> {
        None
    }

    fn name(&self) -> &str {
        self.info().name()
    }

    fn description(&self) -> &str {
        self.info().description()
    }

    fn purpose(&self) -> PropertyPurpose {
        self.info().purpose()
    }

    fn set_purpose(&self, purpose: PropertyPurpose) {
        self.info().set_purpose(purpose);
    }

    fn is_hidden(&self) -> bool {
        self.info().is_hidden()
    }

    fn set_hidden(&self, hidden: bool) {
        self.info().set_hidden(hidden);
    }
}

/// Downcasting helpers for shared property handles.
pub trait PropertyExt {
    /// The concrete variable, if this property holds a `T`.
    fn downcast<T: PropertyValue>(&self) -> Option<Arc<PropertyVariable<T>>>;

    /// The concrete group, if this property is one.
    fn to_group(&self) -> Option<Arc<PropertyGroup>>;

    /// The concrete object property, if this property wraps an `O`.
    fn downcast_object<O: PropertyObjectValue>(&self) -> Option<Arc<PropertyObject<O>>>;
}

impl PropertyExt for Arc<dyn Property> {
    fn downcast<T: PropertyValue>(&self) -> Option<Arc<PropertyVariable<T>>> {
        Arc::clone(self).into_any().downcast().ok()
    }

    fn to_group(&self) -> Option<Arc<PropertyGroup>> {
        Arc::clone(self).into_any().downcast().ok()
    }

    fn downcast_object<O: PropertyObjectValue>(&self) -> Option<Arc<PropertyObject<O>>> {
        Arc::clone(self).into_any().downcast().ok()
    }
}

/// Identity of a property, independent of the handle type used to reach it.
pub(crate) fn property_key(property: &dyn Property) -> usize {
    property as *const dyn Property as *const () as usize
}
