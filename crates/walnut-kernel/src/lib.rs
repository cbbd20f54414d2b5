//! Module dataflow kernel for Walnut.
//!
//! Modules are processing units with typed input and output connectors and a
//! tree of properties. Each live module runs on its own thread and blocks on a
//! condition set until its inputs, its properties or its shutdown flag change.
//!
//! - [`module`]: the [`Module`] trait and the kernel state every module embeds
//! - [`connector`]: typed ports and the data they carry
//! - [`factory`] and [`loader`]: the prototype registry and its discovery
//! - [`container`]: live modules and their threads
//! - [`combiner`] and [`project`]: building graphs, from code or project files
//! - [`Kernel`]: the composition root tying it together
//!
//! # Example
//!
//! ```no_run
//! use walnut_kernel::{Kernel, KernelConfig};
//!
//! let config = KernelConfig::load("walnut.toml")?;
//! let kernel = Kernel::new(config);
//! kernel.start()?;
//!
//! let report = kernel.load_project("session.wnp")?;
//! for warning in report.warnings() {
//!     eprintln!("{warning}");
//! }
//!
//! kernel.save_project("session.wnp")?;
//! kernel.shutdown();
//! # Ok::<(), walnut_kernel::KernelError>(())
//! ```

pub mod combiner;
pub mod config;
pub mod connector;
pub mod container;
pub mod dataset;
mod error;
pub mod factory;
mod kernel;
pub mod loader;
pub mod module;
pub mod modules;
pub mod project;

pub use combiner::{ApplyCombiner, CombinerReport, CombinerWarning, CompatiblesGroup, ModuleCombiner};
pub use config::{KernelConfig, ParseMode, ProjectConfig, ThreadConfig};
pub use connector::{Connector, ConnectorDirection, InputData, OutputData};
pub use container::{ModuleContainer, ModuleId};
pub use dataset::{DataType, FileDataset};
pub use error::{KernelError, KernelResult, ModuleError};
pub use factory::{ModuleFactory, ModuleFactoryBuilder};
pub use kernel::{Kernel, KernelBuilder};
pub use loader::{FnProvider, ModuleLoader, PrototypeProvider};
pub use module::{
    Module, ModuleBase, ModuleStartState, initialize_module, start_module, stop_module,
};
pub use modules::{DATA_MODULE_NAME, DataModule};
pub use project::{ProjectFile, ProjectFileCombiner, ProjectRecord};
