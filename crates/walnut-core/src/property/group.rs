//! Hierarchical property groups.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::types::{PropertyType, PropertyValue, PropertyVariant};
use super::variable::PropertyVariable;
use super::{Property, PropertyInfo, PropertyOptions, property_key};
use crate::condition::{Condition, Subscription};
use crate::error::{PropertyError, PropertyResult};
use crate::shared::{ReadTicket, SharedSequenceContainer};

/// Separator of nested property paths.
pub const PATH_SEPARATOR: char = '/';

/// A named, ordered collection of properties and nested groups.
///
/// Names are unique within one group. The group's update condition fires once
/// for every fire of any member's update condition, so waiting on a module's
/// root group covers every property it has, at any depth. Members sharing one
/// condition are subscribed to once.
///
/// The member list is only reachable through [`get_read_ticket`](Self::get_read_ticket);
/// hold the ticket while iterating.
pub struct PropertyGroup {
    info: PropertyInfo,
    properties: SharedSequenceContainer<Arc<dyn Property>>,
    child_update: Condition,
    wiring: Mutex<Vec<Wire>>,
}

/// One subscription to a member condition, shared by every member using it.
struct Wire {
    condition: Condition,
    members: Vec<usize>,
    _subscription: Subscription,
}

impl PropertyGroup {
    /// Create an empty group.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            info: PropertyInfo::new(name, description),
            properties: SharedSequenceContainer::default(),
            child_update: Condition::new(),
            wiring: Mutex::new(Vec::new()),
        }
    }

    /// Create and register a new property.
    pub fn add_property<T: PropertyValue>(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        initial: T,
    ) -> PropertyResult<Arc<PropertyVariable<T>>> {
        self.add_property_with(name, description, initial, PropertyOptions::default())
    }

    /// Create and register a new property with a shared condition, a notifier
    /// or other options.
    pub fn add_property_with<T: PropertyValue>(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        initial: T,
        options: PropertyOptions,
    ) -> PropertyResult<Arc<PropertyVariable<T>>> {
        let property = Arc::new(PropertyVariable::with_options(
            name,
            description,
            initial,
            options,
        ));
        self.add_existing(property.clone())?;
        Ok(property)
    }

    /// Create and register a nested group.
    pub fn add_property_group(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> PropertyResult<Arc<PropertyGroup>> {
        self.add_property_group_with(name, description, false)
    }

    /// Create and register a nested group, optionally hidden.
    pub fn add_property_group_with(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        hide: bool,
    ) -> PropertyResult<Arc<PropertyGroup>> {
        let group = Arc::new(PropertyGroup::new(name, description));
        group.set_hidden(hide);
        self.add_existing(group.clone())?;
        Ok(group)
    }

    /// Register an existing property.
    ///
    /// Fails if the name is invalid, the name is already taken in this group,
    /// or the property belongs to another group. Nothing changes on failure.
    pub fn add_existing(&self, property: Arc<dyn Property>) -> PropertyResult<()> {
        let name = property.name().to_string();
        if name.is_empty() || name.contains(PATH_SEPARATOR) {
            return Err(PropertyError::invalid_name(name));
        }
        if !property.info().attach() {
            return Err(PropertyError::AlreadyAttached { name });
        }

        let mut ticket = self.properties.get_write_ticket();
        if ticket.iter().any(|p| p.name() == name) {
            property.info().detach();
            return Err(PropertyError::NameCollision {
                name,
                group: self.info.name().to_string(),
            });
        }

        self.wire(property.as_ref());
        ticket.push(property);
        drop(ticket);

        tracing::trace!(target: "walnut_core::property", group = %self.info.name(), property = %name, "property added");
        Ok(())
    }

    /// Remove a property. Returns `false` if it is not a member.
    ///
    /// The property stops propagating into this group's update condition.
    pub fn remove_property(&self, property: &dyn Property) -> bool {
        let key = property_key(property);
        let removed = {
            let mut ticket = self.properties.get_write_ticket();
            let before = ticket.len();
            ticket.retain(|p| property_key(p.as_ref()) != key);
            before != ticket.len()
        };
        if removed {
            self.unwire(key);
            property.info().detach();
        }
        removed
    }

    /// Remove every member.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.properties.get_write_ticket());
        for property in &removed {
            self.unwire(property_key(property.as_ref()));
            property.info().detach();
        }
    }

    fn wire(&self, property: &dyn Property) {
        let key = property_key(property);
        let condition = property.update_condition();
        let mut wiring = self.wiring.lock();
        if let Some(wire) = wiring.iter_mut().find(|w| w.condition.ptr_eq(condition)) {
            wire.members.push(key);
            return;
        }
        let target = self.child_update.downgrade();
        wiring.push(Wire {
            condition: condition.clone(),
            members: vec![key],
            _subscription: condition.subscribe_signal(move || target.notify()),
        });
    }

    fn unwire(&self, key: usize) {
        let released: Vec<Wire> = {
            let mut wiring = self.wiring.lock();
            for wire in wiring.iter_mut() {
                wire.members.retain(|k| *k != key);
            }
            let (released, kept) = wiring.drain(..).partition(|w| w.members.is_empty());
            *wiring = kept;
            released
        };
        // Unsubscribe outside the lock.
        drop(released);
    }

    /// Look up a property by name or `/`-separated path.
    pub fn find_property(&self, path: &str) -> Option<Arc<dyn Property>> {
        let (head, rest) = match path.split_once(PATH_SEPARATOR) {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let child = self
            .properties
            .get_read_ticket()
            .iter()
            .find(|p| p.name() == head)
            .cloned()?;
        match rest {
            None => Some(child),
            Some(rest) => child.as_group()?.find_property(rest),
        }
    }

    /// Look up a property that must exist.
    pub fn get_property(&self, path: &str) -> PropertyResult<Arc<dyn Property>> {
        self.find_property(path)
            .ok_or_else(|| PropertyError::not_found(path))
    }

    /// Look up a property that must exist and hold a `T`.
    pub fn get_typed<T: PropertyValue>(&self, path: &str) -> PropertyResult<Arc<PropertyVariable<T>>> {
        let property = self.get_property(path)?;
        let actual = property.property_type();
        Arc::clone(&property)
            .into_any()
            .downcast()
            .map_err(|_| PropertyError::TypeMismatch {
                name: path.to_string(),
                expected: T::PROPERTY_TYPE,
                actual,
            })
    }

    /// Whether a property exists under this name or path.
    pub fn exists_property(&self, path: &str) -> bool {
        self.find_property(path).is_some()
    }

    /// Shared access to the member list.
    pub fn get_read_ticket(&self) -> ReadTicket<'_, Vec<Arc<dyn Property>>> {
        self.properties.get_read_ticket()
    }

    /// Number of direct members.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Condition fired when a member is added or removed.
    pub fn list_change_condition(&self) -> &Condition {
        self.properties.change_condition()
    }

    /// Recursive deep copy with fresh, unconnected conditions.
    pub fn clone_group(&self) -> PropertyGroup {
        let copy = PropertyGroup::new(self.info.name(), self.info.description());
        copy.set_purpose(self.purpose());
        copy.set_hidden(self.is_hidden());
        let members = self.properties.snapshot();
        for property in members {
            // Fresh copies are unattached and the names were unique here.
            if let Err(err) = copy.add_existing(property.clone_property()) {
                tracing::warn!(target: "walnut_core::property", %err, "failed to copy property");
            }
        }
        copy
    }

    /// Visit every leaf property with its `/`-joined path, depth first.
    pub fn visit_leaves(&self, prefix: &str, visit: &mut dyn FnMut(&str, &Arc<dyn Property>)) {
        let ticket = self.get_read_ticket();
        for property in ticket.iter() {
            let path = if prefix.is_empty() {
                property.name().to_string()
            } else {
                format!("{prefix}{PATH_SEPARATOR}{}", property.name())
            };
            match property.as_group() {
                Some(group) => group.visit_leaves(&path, visit),
                None => visit(&path, property),
            }
        }
    }
}

impl Property for PropertyGroup {
    fn info(&self) -> &PropertyInfo {
        &self.info
    }

    fn property_type(&self) -> PropertyType {
        PropertyType::Group
    }

    fn update_condition(&self) -> &Condition {
        &self.child_update
    }

    fn get_as_string(&self) -> String {
        String::new()
    }

    fn set_as_string(&self, _value: &str) -> bool {
        false
    }

    fn get_variant(&self) -> Option<PropertyVariant> {
        None
    }

    fn set_variant(&self, _value: PropertyVariant) -> bool {
        false
    }

    /// Copy values from a group with the same layout, matching members by name.
    ///
    /// Members missing on either side are skipped. Returns `false` if `other`
    /// is not a group or any matched member rejected its new value.
    fn set_from(&self, other: &dyn Property) -> bool {
        let Some(other) = other.as_group() else {
            return false;
        };
        let theirs = other.properties.snapshot();
        let mut all_accepted = true;
        for source in theirs {
            if let Some(target) = self.find_property(source.name()) {
                all_accepted &= target.set_from(source.as_ref());
            }
        }
        all_accepted
    }

    fn clone_property(&self) -> Arc<dyn Property> {
        Arc::new(self.clone_group())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn as_group(&self) -> Option<&PropertyGroup> {
        Some(self)
    }
}

impl Drop for PropertyGroup {
    fn drop(&mut self) {
        for property in self.properties.get_read_ticket().iter() {
            property.info().detach();
        }
    }
}

impl fmt::Debug for PropertyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .get_read_ticket()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        f.debug_struct("PropertyGroup")
            .field("name", &self.info.name())
            .field("properties", &names)
            .finish()
    }
}

static_assertions::assert_impl_all!(PropertyGroup: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyExt;
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
    fn test_end_to_end_int_property() {
        let group = PropertyGroup::new("root", "");
        let p = group.add_property("x", "", 5).unwrap();
        p.set_min(0);
        p.set_max(10);

        assert!(!p.set(15));
        assert_eq!(p.get(), 5);
        assert!(p.set(7));
        assert_eq!(p.get(), 7);

        let found = group.get_property("x").unwrap().downcast::<i32>().unwrap();
        assert!(Arc::ptr_eq(&found, &p));
        assert_eq!(found.get(), 7);
    }

    #[test]
    fn test_name_collision_rejected() {
        let group = PropertyGroup::new("root", "");
        let first = group.add_property("x", "", 1).unwrap();
        let err = group.add_property("x", "", 2.0).unwrap_err();
        assert!(matches!(err, PropertyError::NameCollision { .. }));
        assert_eq!(group.len(), 1);

        // The original survives untouched.
        let found = group.get_typed::<i32>("x").unwrap();
        assert!(Arc::ptr_eq(&found, &first));
    }

    #[test]
    fn test_invalid_names() {
        let group = PropertyGroup::new("root", "");
        assert!(matches!(
            group.add_property("", "", 1),
            Err(PropertyError::InvalidName { .. })
        ));
        assert!(matches!(
            group.add_property("a/b", "", 1),
            Err(PropertyError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_property_belongs_to_one_group() {
        let a = PropertyGroup::new("a", "");
        let b = PropertyGroup::new("b", "");
        let p = a.add_property("x", "", 1).unwrap();

        let err = b.add_existing(p.clone()).unwrap_err();
        assert!(matches!(err, PropertyError::AlreadyAttached { .. }));

        assert!(a.remove_property(p.as_ref()));
        assert!(b.add_existing(p.clone()).is_ok());
    }

    #[test]
    fn test_lookup_variants() {
        let group = PropertyGroup::new("root", "");
        let nested = group.add_property_group("render", "").unwrap();
        let deep = nested.add_property_group("colors", "").unwrap();
        deep.add_property("alpha", "", 0.5).unwrap();

        assert!(group.exists_property("render/colors/alpha"));
        assert!(!group.exists_property("render/alpha"));
        assert!(group.find_property("nope").is_none());
        assert!(matches!(
            group.get_property("render/nope"),
            Err(PropertyError::NotFound { .. })
        ));
        assert!(matches!(
            group.get_typed::<i32>("render/colors/alpha"),
            Err(PropertyError::TypeMismatch { .. })
        ));
        assert_eq!(
            group.get_property("render").unwrap().property_type(),
            PropertyType::Group
        );
    }

    #[test]
    fn test_aggregate_propagation_once_per_fire() {
        let group = PropertyGroup::new("root", "");
        let a = group.add_property("a", "", 1).unwrap();
        let b = group.add_property("b", "", false).unwrap();
        let (fires, _sub) = count_fires(group.update_condition());

        a.set(2);
        assert_eq!(fires.load(Ordering::SeqCst), 1);
        b.set(true);
        assert_eq!(fires.load(Ordering::SeqCst), 2);
        a.update_condition().notify();
        assert_eq!(fires.load(Ordering::SeqCst), 3);

        // Rejected writes do not propagate.
        a.set_max(5);
        a.set(9);
        assert_eq!(fires.load(Ordering::SeqCst), 3);

        assert!(group.remove_property(a.as_ref()));
        assert!(!group.remove_property(a.as_ref()));
        a.set(3);
        assert_eq!(fires.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_shared_condition_fires_group_once() {
        let group = PropertyGroup::new("root", "");
        let shared = Condition::new();
        let options = || PropertyOptions::new().condition(shared.clone());
        let a = group.add_property_with("a", "", 1, options()).unwrap();
        let b = group.add_property_with("b", "", 2.0, options()).unwrap();
        let c = group.add_property_with("c", "", true, options()).unwrap();
        let (fires, _sub) = count_fires(group.update_condition());

        a.set(10);
        assert_eq!(fires.load(Ordering::SeqCst), 1);
        c.set(false);
        assert_eq!(fires.load(Ordering::SeqCst), 2);

        // Still wired while one member uses the condition.
        assert!(group.remove_property(a.as_ref()));
        assert!(group.remove_property(c.as_ref()));
        b.set(3.0);
        assert_eq!(fires.load(Ordering::SeqCst), 3);

        assert!(group.remove_property(b.as_ref()));
        shared.notify();
        assert_eq!(fires.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_nested_propagation() {
        let root = PropertyGroup::new("root", "");
        let nested = root.add_property_group("nested", "").unwrap();
        let leaf = nested.add_property("leaf", "", 0).unwrap();
        let (root_fires, _a) = count_fires(root.update_condition());
        let (nested_fires, _b) = count_fires(nested.update_condition());

        leaf.set(1);
        assert_eq!(nested_fires.load(Ordering::SeqCst), 1);
        assert_eq!(root_fires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clone_group_is_deep_and_decoupled() {
        let root = PropertyGroup::new("root", "");
        let x = root.add_property("x", "", 1).unwrap();
        let nested = root.add_property_group("nested", "").unwrap();
        nested.add_property("y", "", String::from("a")).unwrap();

        let copy = root.clone_group();
        let (copy_fires, _sub) = count_fires(copy.update_condition());

        assert_eq!(copy.len(), 2);
        let copy_x = copy.get_typed::<i32>("x").unwrap();
        assert!(!Arc::ptr_eq(&copy_x, &x));

        x.set(5);
        assert_eq!(copy_x.get(), 1);
        assert_eq!(copy_fires.load(Ordering::SeqCst), 0);

        copy.get_typed::<String>("nested/y").unwrap().set("b".into());
        assert_eq!(copy_fires.load(Ordering::SeqCst), 1);
        assert_eq!(root.get_property("nested/y").unwrap().get_as_string(), "a");
    }

    #[test]
    fn test_group_set_from_by_name() {
        let a = PropertyGroup::new("a", "");
        a.add_property("x", "", 1).unwrap();
        a.add_property("only_a", "", true).unwrap();
        let b = PropertyGroup::new("b", "");
        b.add_property("x", "", 9).unwrap();

        assert!(a.set_from(&b));
        assert_eq!(a.get_typed::<i32>("x").unwrap().get(), 9);
        assert!(!a.set_from(b.get_property("x").unwrap().as_ref()));
    }

    #[test]
    fn test_clear_detaches() {
        let group = PropertyGroup::new("root", "");
        let p = group.add_property("x", "", 1).unwrap();
        let (fires, _sub) = count_fires(group.update_condition());

        group.clear();
        assert!(group.is_empty());
        assert!(!p.info().is_attached());
        p.set(2);
        assert_eq!(fires.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_visit_leaves_paths() {
        let root = PropertyGroup::new("root", "");
        root.add_property("a", "", 1).unwrap();
        let g = root.add_property_group("g", "").unwrap();
        g.add_property("b", "", 2).unwrap();
        g.add_property_group("empty", "").unwrap();

        let mut paths = Vec::new();
        root.visit_leaves("", &mut |path, _| paths.push(path.to_string()));
        assert_eq!(paths, vec!["a", "g/b"]);
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let group = Arc::new(PropertyGroup::new("root", ""));
        let writer = {
            let group = group.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    group.add_property(format!("p{i}"), "", i).unwrap();
                }
            })
        };
        let reader = {
            let group = group.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let ticket = group.get_read_ticket();
                    let names: Vec<_> = ticket.iter().map(|p| p.name().to_string()).collect();
                    assert_eq!(names.len(), ticket.len());
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(group.len(), 50);
    }
}
