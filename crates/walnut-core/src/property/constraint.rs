//! Constraints restricting the values a property accepts.
//!
//! A constraint is a side-effect-free predicate over a proposed value. All
//! constraints attached to a property must accept a value for `set` to commit
//! it; the order in which they are asked is unspecified.

use std::any::Any;
use std::fmt;
use std::path::PathBuf;

use super::types::{PropertyValue, Selection, TransferFunction};
use super::variable::PropertyVariable;

/// Kind tag of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Min,
    Max,
    NotEmpty,
    PathExists,
    IsFile,
    IsDirectory,
    SelectOnlyOne,
    SelectAtLeastOne,
    Custom,
}

/// A predicate attached to a [`PropertyVariable<T>`].
pub trait PropertyConstraint<T: PropertyValue>: Send + Sync + fmt::Debug + 'static {
    /// Whether `value` may be stored in `property`.
    fn accept(&self, property: &PropertyVariable<T>, value: &T) -> bool;

    /// The kind of this constraint.
    fn kind(&self) -> ConstraintKind;

    fn as_any(&self) -> &dyn Any;
}

/// Lower bound, inclusive, compared with the type's native ordering.
#[derive(Debug, Clone)]
pub struct MinConstraint<T> {
    min: T,
}

impl<T> MinConstraint<T> {
    pub fn new(min: T) -> Self {
        Self { min }
    }

    pub fn min(&self) -> &T {
        &self.min
    }
}

impl<T: PropertyValue + PartialOrd> PropertyConstraint<T> for MinConstraint<T> {
    fn accept(&self, _property: &PropertyVariable<T>, value: &T) -> bool {
        *value >= self.min
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Min
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Upper bound, inclusive.
#[derive(Debug, Clone)]
pub struct MaxConstraint<T> {
    max: T,
}

impl<T> MaxConstraint<T> {
    pub fn new(max: T) -> Self {
        Self { max }
    }

    pub fn max(&self) -> &T {
        &self.max
    }
}

impl<T: PropertyValue + PartialOrd> PropertyConstraint<T> for MaxConstraint<T> {
    fn accept(&self, _property: &PropertyVariable<T>, value: &T) -> bool {
        *value <= self.max
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Max
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Types with a notion of emptiness, usable with [`NotEmptyConstraint`].
pub trait Emptiness {
    fn is_empty_value(&self) -> bool;
}

impl Emptiness for String {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl Emptiness for PathBuf {
    fn is_empty_value(&self) -> bool {
        self.as_os_str().is_empty()
    }
}

impl Emptiness for Selection {
    fn is_empty_value(&self) -> bool {
        self.selected_count() == 0
    }
}

impl Emptiness for TransferFunction {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

/// Rejects empty values.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotEmptyConstraint;

impl<T: PropertyValue + Emptiness> PropertyConstraint<T> for NotEmptyConstraint {
    fn accept(&self, _property: &PropertyVariable<T>, value: &T) -> bool {
        !value.is_empty_value()
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::NotEmpty
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

macro_rules! path_constraint {
    ($(#[$meta:meta])* $name:ident, $kind:ident, $check:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl PropertyConstraint<PathBuf> for $name {
            fn accept(&self, _property: &PropertyVariable<PathBuf>, value: &PathBuf) -> bool {
                let check: fn(&PathBuf) -> bool = $check;
                check(value)
            }

            fn kind(&self) -> ConstraintKind {
                ConstraintKind::$kind
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

path_constraint!(
    /// Only accepts paths that exist.
    PathExistsConstraint,
    PathExists,
    |path| path.exists()
);
path_constraint!(
    /// Only accepts paths to existing regular files.
    IsFileConstraint,
    IsFile,
    |path| path.is_file()
);
path_constraint!(
    /// Only accepts paths to existing directories.
    IsDirectoryConstraint,
    IsDirectory,
    |path| path.is_dir()
);

/// Accepts selections with exactly one selected item.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectOnlyOneConstraint;

impl PropertyConstraint<Selection> for SelectOnlyOneConstraint {
    fn accept(&self, _property: &PropertyVariable<Selection>, value: &Selection) -> bool {
        value.selected_count() == 1
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::SelectOnlyOne
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Accepts selections with at least one selected item.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectAtLeastOneConstraint;

impl PropertyConstraint<Selection> for SelectAtLeastOneConstraint {
    fn accept(&self, _property: &PropertyVariable<Selection>, value: &Selection) -> bool {
        value.selected_count() >= 1
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::SelectAtLeastOne
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A custom constraint built from a closure.
pub struct ConstraintFn<T> {
    predicate: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> ConstraintFn<T> {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Box::new(predicate),
        }
    }
}

impl<T> fmt::Debug for ConstraintFn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintFn").finish_non_exhaustive()
    }
}

impl<T: PropertyValue> PropertyConstraint<T> for ConstraintFn<T> {
    fn accept(&self, _property: &PropertyVariable<T>, value: &T) -> bool {
        (self.predicate)(value)
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Custom
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::SelectionItem;
    use std::sync::Arc;

    #[test]
    fn test_min_max_inclusive() {
        let prop = PropertyVariable::new("v", "", 5.0f64);
        let min = MinConstraint::new(0.0);
        let max = MaxConstraint::new(1.0);
        assert!(min.accept(&prop, &0.0));
        assert!(!min.accept(&prop, &-0.1));
        assert!(max.accept(&prop, &1.0));
        assert!(!max.accept(&prop, &f64::NAN));
    }

    #[test]
    fn test_not_empty() {
        let s = PropertyVariable::new("s", "", String::from("x"));
        assert!(!PropertyConstraint::<String>::accept(&NotEmptyConstraint, &s, &String::new()));

        let p = PropertyVariable::new("p", "", PathBuf::from("a"));
        assert!(!PropertyConstraint::<PathBuf>::accept(&NotEmptyConstraint, &p, &PathBuf::new()));
    }

    #[test]
    fn test_path_constraints() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.txt");
        std::fs::write(&file, "x").unwrap();
        let prop = PropertyVariable::new("p", "", PathBuf::new());

        assert!(IsDirectoryConstraint.accept(&prop, &dir.path().to_path_buf()));
        assert!(!IsDirectoryConstraint.accept(&prop, &file));
        assert!(IsFileConstraint.accept(&prop, &file));
        assert!(PathExistsConstraint.accept(&prop, &file));
        assert!(!PathExistsConstraint.accept(&prop, &dir.path().join("missing")));
    }

    #[test]
    fn test_selection_constraints() {
        let items: Arc<[SelectionItem]> =
            vec![SelectionItem::new("a", ""), SelectionItem::new("b", "")].into();
        let none = Selection::new(items);
        let one = none.select_only(0).unwrap();
        let two = none.with_selected([0, 1]).unwrap();
        let prop = PropertyVariable::new("s", "", none.clone());

        assert!(!SelectOnlyOneConstraint.accept(&prop, &none));
        assert!(SelectOnlyOneConstraint.accept(&prop, &one));
        assert!(!SelectOnlyOneConstraint.accept(&prop, &two));
        assert!(!SelectAtLeastOneConstraint.accept(&prop, &none));
        assert!(SelectAtLeastOneConstraint.accept(&prop, &two));
    }

    #[test]
    fn test_custom_constraint() {
        let even = ConstraintFn::new(|v: &i32| v % 2 == 0);
        let prop = PropertyVariable::new("i", "", 0);
        assert!(even.accept(&prop, &4));
        assert!(!even.accept(&prop, &3));
        assert_eq!(even.kind(), ConstraintKind::Custom);
    }
}
