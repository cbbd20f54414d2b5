//! Dataset handles flowing through connectors.
//!
//! The kernel does not know what a dataset contains. Connectors carry
//! `Arc<T>` for any `T: Send + Sync + 'static` and check compatibility through
//! [`DataType`], a `TypeId` paired with a readable name for logs and errors.

use std::any::{Any, TypeId};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Runtime identity of the dataset type a connector transports.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataType {
    id: TypeId,
    name: &'static str,
}

impl DataType {
    /// The data type of `T`.
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Full type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path.
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }

    /// Whether data of this type can be fed into a connector of type `other`.
    pub fn is_compatible_with(&self, other: &DataType) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Type-erased dataset as stored in an output connector.
pub type AnyData = Arc<dyn Any + Send + Sync>;

/// A dataset backed by a file on disk.
///
/// Loading the file is up to the consumer; the kernel only passes the handle on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDataset {
    filename: PathBuf,
}

impl FileDataset {
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
        }
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }
}
