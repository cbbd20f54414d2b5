//! Core systems for Walnut.
//!
//! This crate provides the foundational, thread-safe building blocks the
//! module kernel and every module are written against:
//!
//! - **Signals**: Multi-subscriber callbacks invoked on the emitting thread
//! - **Conditions**: Waitable notifications, condition sets (wait on any of
//!   several conditions) and RAII callback subscriptions
//! - **Flags**: Typed values coupled with a condition fired on every accepted change
//! - **Shared Containers**: Reader-writer protected values accessed through
//!   scoped read/write tickets
//! - **Properties**: Typed, constrainable, observable parameters with string
//!   and variant access, organized in hierarchical groups
//!
//! # Condition Example
//!
//! ```
//! use walnut_core::{Condition, ConditionSet, Flag};
//!
//! // A module-style wait set: wake on shutdown or on new input.
//! let shutdown = Flag::new(false);
//! let input_changed = Condition::new();
//!
//! let wait_set = ConditionSet::new();
//! wait_set.add(shutdown.condition());
//! wait_set.add(&input_changed);
//! wait_set.set_resetable(true, true);
//!
//! shutdown.set(true);
//! wait_set.wait(); // returns at once: a member fired before the wait
//! assert!(shutdown.get());
//! ```
//!
//! # Property Example
//!
//! ```
//! use walnut_core::property::{PropertyGroup, PropertyExt};
//!
//! let properties = PropertyGroup::new("Properties", "");
//! let iso = properties.add_property("isovalue", "Surface threshold", 100.0).unwrap();
//! iso.set_min(0.0);
//!
//! assert!(!iso.set(-1.0));
//! assert!(properties.get_property("isovalue").unwrap().set_as_string("250"));
//! assert_eq!(iso.get(), 250.0);
//! ```

mod condition;
mod error;
mod flag;
pub mod logging;
pub mod property;
pub mod shared;
pub mod signal;

pub use condition::{Condition, ConditionSet, Subscription, WeakCondition};
pub use error::{PropertyError, PropertyResult};
pub use flag::{Acceptor, Flag};
pub use logging::{PerfSpan, PropertyTreeDebug, TreeFormatOptions, TreeStyle};
pub use property::{
    Property, PropertyExt, PropertyGroup, PropertyOptions, PropertyPurpose, PropertyType,
    PropertyValue, PropertyVariable, PropertyVariant,
};
pub use shared::{
    ReadTicket, SharedAssociativeContainer, SharedObject, SharedSequenceContainer, WriteTicket,
};
pub use signal::{ConnectionGuard, ConnectionId, Signal};

// Re-export the vector type used by position properties.
pub use glam::DVec3;
