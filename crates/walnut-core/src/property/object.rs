//! Properties wrapping arbitrary objects.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::types::{PropertyType, PropertyVariant};
use super::{Property, PropertyInfo};
use crate::condition::Condition;

/// An object that can be exposed as a property.
///
/// The object supplies its own string conversion; the property supplies
/// naming, locking and change notification.
pub trait PropertyObjectValue: Clone + Send + Sync + fmt::Debug + 'static {
    /// Serialize the object.
    fn get_as_string(&self) -> String;

    /// Update the object from its serialized form. Returns `false` on failure,
    /// in which case the object must be left unchanged.
    fn set_as_string(&mut self, value: &str) -> bool;

    /// Take over the state of another object of the same type.
    fn set_from(&mut self, other: &Self) -> bool {
        *self = other.clone();
        true
    }
}

/// A property of type [`PropertyType::Struct`] around an object `O`.
pub struct PropertyObject<O: PropertyObjectValue> {
    info: PropertyInfo,
    object: RwLock<O>,
    condition: Condition,
}

impl<O: PropertyObjectValue> PropertyObject<O> {
    pub fn new(name: impl Into<String>, description: impl Into<String>, object: O) -> Self {
        Self {
            info: PropertyInfo::new(name, description),
            object: RwLock::new(object),
            condition: Condition::new(),
        }
    }

    /// Copy of the wrapped object.
    pub fn get(&self) -> O {
        self.object.read().clone()
    }

    /// Read the wrapped object in place.
    pub fn with<R>(&self, f: impl FnOnce(&O) -> R) -> R {
        f(&self.object.read())
    }

    /// Mutate the wrapped object, then fire the update condition.
    pub fn modify<R>(&self, f: impl FnOnce(&mut O) -> R) -> R {
        let result = f(&mut self.object.write());
        self.condition.notify();
        result
    }
}

impl<O: PropertyObjectValue> Property for PropertyObject<O> {
    fn info(&self) -> &PropertyInfo {
        &self.info
    }

    fn property_type(&self) -> PropertyType {
        PropertyType::Struct
    }

    fn update_condition(&self) -> &Condition {
        &self.condition
    }

    fn get_as_string(&self) -> String {
        self.object.read().get_as_string()
    }

    fn set_as_string(&self, value: &str) -> bool {
        let accepted = self.object.write().set_as_string(value);
        if accepted {
            self.condition.notify();
        }
        accepted
    }

    fn get_variant(&self) -> Option<PropertyVariant> {
        None
    }

    fn set_variant(&self, _value: PropertyVariant) -> bool {
        false
    }

    fn set_from(&self, other: &dyn Property) -> bool {
        let Some(other) = other.as_any().downcast_ref::<PropertyObject<O>>() else {
            return false;
        };
        let source = other.get();
        let accepted = self.object.write().set_from(&source);
        if accepted {
            self.condition.notify();
        }
        accepted
    }

    fn clone_property(&self) -> Arc<dyn Property> {
        let copy = PropertyObject::new(self.info.name(), self.info.description(), self.get());
        copy.set_purpose(self.purpose());
        copy.set_hidden(self.is_hidden());
        Arc::new(copy)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<O: PropertyObjectValue> fmt::Debug for PropertyObject<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyObject")
            .field("name", &self.info.name())
            .field("object", &*self.object.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{PropertyExt, PropertyGroup};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Window {
        lower: f64,
        upper: f64,
    }

    impl PropertyObjectValue for Window {
        fn get_as_string(&self) -> String {
            format!("{}..{}", self.lower, self.upper)
        }

        fn set_as_string(&mut self, value: &str) -> bool {
            let Some((lower, upper)) = value.split_once("..") else {
                return false;
            };
            match (lower.parse::<f64>(), upper.parse::<f64>()) {
                (Ok(lower), Ok(upper)) if lower <= upper => {
                    self.lower = lower;
                    self.upper = upper;
                    true
                }
                _ => false,
            }
        }
    }

    #[test]
    fn test_object_string_access_fires() {
        let prop = PropertyObject::new("window", "", Window::default());
        let fires = Arc::new(AtomicUsize::new(0));
        let fires_clone = fires.clone();
        let _sub = prop.update_condition().subscribe_signal(move || {
            fires_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(prop.property_type(), PropertyType::Struct);
        assert!(prop.set_as_string("1..4.5"));
        assert_eq!(prop.get_as_string(), "1..4.5");
        assert!(!prop.set_as_string("9..1"));
        assert_eq!(prop.get(), Window { lower: 1.0, upper: 4.5 });
        assert_eq!(fires.load(Ordering::SeqCst), 1);

        prop.modify(|w| w.upper = 8.0);
        assert_eq!(fires.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_object_in_group() {
        let group = PropertyGroup::new("root", "");
        let prop = Arc::new(PropertyObject::new("window", "", Window::default()));
        group.add_existing(prop.clone()).unwrap();

        let found = group.get_property("window").unwrap();
        assert!(found.downcast_object::<Window>().is_some());
        assert!(found.downcast::<i32>().is_none());

        let copy = found.clone_property();
        assert!(copy.set_as_string("2..3"));
        assert_eq!(prop.get(), Window::default());
        assert!(prop.set_from(copy.as_ref()));
        assert_eq!(prop.get_as_string(), "2..3");
    }
}
