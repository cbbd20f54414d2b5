//! Modules shipped with the kernel.

mod data;

pub use data::{DATA_MODULE_NAME, DataModule};
