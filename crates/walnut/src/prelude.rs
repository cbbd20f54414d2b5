//! Prelude module for Walnut.
//!
//! This module re-exports the most commonly used types for convenient importing:
//!
//! ```
//! use walnut::prelude::*;
//! ```
//!
//! This provides access to:
//! - Synchronization (`Condition`, `ConditionSet`, `Flag`, `Signal`)
//! - Properties (`Property`, `PropertyGroup`, `PropertyVariable` and its aliases)
//! - Modules (`Module`, `ModuleBase`, connectors, `Kernel`)

// ============================================================================
// Synchronization
// ============================================================================

pub use crate::signal::{ConnectionGuard, ConnectionId, Signal};
pub use crate::{Condition, ConditionSet, Flag, Subscription};

// ============================================================================
// Property System
// ============================================================================

pub use crate::property::{
    Color, PropBool, PropColor, PropDouble, PropFilename, PropInt, PropPosition, PropSelection,
    PropString, PropTransferFunction, PropTrigger, Property, PropertyExt, PropertyGroup,
    PropertyOptions, PropertyType, PropertyVariable, Selection, Trigger,
};
pub use crate::{PropertyError, PropertyResult};

// ============================================================================
// Module Kernel
// ============================================================================

pub use crate::kernel::{
    InputData, Kernel, KernelConfig, KernelError, KernelResult, Module, ModuleBase, ModuleError,
    OutputData,
};
