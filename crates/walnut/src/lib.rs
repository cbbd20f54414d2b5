//! Walnut: typed observable properties and a threaded module dataflow kernel.
//!
//! This is the umbrella crate that re-exports all public APIs. The property
//! system and the synchronization primitives come from `walnut-core` and are
//! available at the crate root; the module kernel lives under [`kernel`].
//!
//! # Example
//!
//! ```no_run
//! use walnut::kernel::{Kernel, KernelConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let kernel = Kernel::new(KernelConfig::load("walnut.toml")?);
//!     kernel.start()?;
//!     let report = kernel.load_project("session.wnp")?;
//!     println!("{} modules loaded", report.modules().len());
//!     kernel.shutdown();
//!     Ok(())
//! }
//! ```

pub use walnut_core::*;

/// Module dataflow kernel.
pub mod kernel {
    pub use walnut_kernel::*;
}

pub mod prelude;
