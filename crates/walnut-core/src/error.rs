//! Error types for Walnut core.
//!
//! Validation failures are never errors here: `set` and `accept` on a
//! property report rejection through their `bool` return value. The errors
//! below cover structural problems with property groups, where the caller
//! asked for something that does not exist or cannot be registered.

use std::fmt;

use crate::property::PropertyType;

/// Property-related errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    /// No property with the given name (or path) exists.
    NotFound {
        /// The name or `/`-separated path that was looked up.
        name: String,
    },
    /// A property with this name is already registered in the group.
    NameCollision {
        /// The colliding name.
        name: String,
        /// The group the collision happened in.
        group: String,
    },
    /// The name is empty or contains the path separator `/`.
    InvalidName {
        /// The rejected name.
        name: String,
    },
    /// The property is already a member of another group.
    AlreadyAttached {
        /// Name of the property.
        name: String,
    },
    /// The property exists but holds a different value type.
    TypeMismatch {
        /// Name of the property.
        name: String,
        /// The type that was requested.
        expected: PropertyType,
        /// The type the property actually has.
        actual: PropertyType,
    },
}

impl PropertyError {
    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub(crate) fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "Property '{name}' not found"),
            Self::NameCollision { name, group } => {
                write!(f, "Property '{name}' already exists in group '{group}'")
            }
            Self::InvalidName { name } => {
                write!(f, "Invalid property name '{name}': names must be non-empty and must not contain '/'")
            }
            Self::AlreadyAttached { name } => {
                write!(f, "Property '{name}' already belongs to a group")
            }
            Self::TypeMismatch {
                name,
                expected,
                actual,
            } => write!(
                f,
                "Property '{name}' type mismatch: expected {expected}, found {actual}"
            ),
        }
    }
}

impl std::error::Error for PropertyError {}

/// Result type for property group operations.
pub type PropertyResult<T> = std::result::Result<T, PropertyError>;
