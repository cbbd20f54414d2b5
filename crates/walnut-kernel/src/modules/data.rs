//! The data source module.

use std::path::PathBuf;
use std::sync::Arc;

use walnut_core::Property;
use walnut_core::property::{PropFilename, PropertyVariable};

use crate::connector::OutputData;
use crate::dataset::FileDataset;
use crate::error::{KernelResult, ModuleError};
use crate::module::{Module, ModuleBase};

/// Prototype name of [`DataModule`].
pub const DATA_MODULE_NAME: &str = "Data Module";

/// Publishes a [`FileDataset`] for the file named by its `filename` property.
///
/// The dataset is republished whenever the property changes. An empty
/// filename publishes nothing. Project files store these modules as `DATA`
/// records.
pub struct DataModule {
    base: ModuleBase,
    filename: PropFilename,
    output: OutputData<FileDataset>,
}

impl DataModule {
    pub fn new() -> Self {
        let base = ModuleBase::new(DATA_MODULE_NAME, "Provides a dataset loaded from a file");
        Self {
            filename: Arc::new(PropertyVariable::new(
                "filename",
                "File the dataset is read from",
                PathBuf::new(),
            )),
            output: OutputData::new(base.name(), "out", "The loaded dataset"),
            base,
        }
    }

    pub fn filename(&self) -> &PropFilename {
        &self.filename
    }

    pub fn output(&self) -> &OutputData<FileDataset> {
        &self.output
    }

    fn publish(&self) {
        let filename = self.filename.get();
        if filename.as_os_str().is_empty() {
            self.output.clear_data();
            return;
        }
        tracing::debug!(
            target: "walnut_kernel::module",
            filename = %filename.display(),
            "publishing dataset"
        );
        self.output.update_data(Arc::new(FileDataset::new(filename)));
    }
}

impl Default for DataModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for DataModule {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn factory(&self) -> Arc<dyn Module> {
        Arc::new(DataModule::new())
    }

    fn connectors(&self) -> KernelResult<()> {
        self.base.add_connector(self.output.connector().clone())
    }

    fn properties(&self) -> KernelResult<()> {
        self.base.properties().add_existing(self.filename.clone())?;
        self.base.module_state().add(self.filename.update_condition());
        Ok(())
    }

    fn module_main(&self) -> Result<(), ModuleError> {
        self.filename.changed(true);
        self.publish();
        self.base.ready();

        while !self.base.shutdown_requested() {
            self.base.module_state().wait();
            if self.filename.changed(true) {
                self.publish();
            }
        }
        Ok(())
    }

    fn data_filename(&self) -> Option<PathBuf> {
        let filename = self.filename.get();
        (!filename.as_os_str().is_empty()).then_some(filename)
    }
}
