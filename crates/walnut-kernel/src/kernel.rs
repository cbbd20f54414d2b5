//! The kernel: composition root of the module system.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use walnut_core::PerfSpan;

use crate::combiner::{CombinerReport, ModuleCombiner};
use crate::config::KernelConfig;
use crate::container::ModuleContainer;
use crate::error::KernelResult;
use crate::factory::{ModuleFactory, ModuleFactoryBuilder};
use crate::loader::{ModuleLoader, PrototypeProvider};
use crate::module::Module;
use crate::modules::DataModule;
use crate::project::{ProjectFile, ProjectFileCombiner};

/// Owns the prototype factory, the root module container and the
/// configuration.
///
/// There is no global kernel; create one and pass it where it is needed.
///
/// # Example
///
/// ```
/// use walnut_kernel::{Kernel, KernelConfig};
///
/// let kernel = Kernel::new(KernelConfig::default());
/// kernel.start().unwrap();
///
/// let module = kernel.apply_module("Data Module").unwrap();
/// assert_eq!(kernel.root_container().module_count(), 1);
/// # drop(module);
/// kernel.shutdown();
/// ```
pub struct Kernel {
    config: KernelConfig,
    factory: ModuleFactory,
    root: ModuleContainer,
}

impl Kernel {
    /// A kernel with the built-in modules only.
    pub fn new(config: KernelConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: KernelConfig) -> KernelBuilder {
        KernelBuilder {
            config,
            factory: ModuleFactory::builder().builtin(Arc::new(DataModule::new())),
            loader: ModuleLoader::new(),
        }
    }

    /// Load all module prototypes. Returns the number of prototypes.
    pub fn start(&self) -> KernelResult<usize> {
        let _perf = PerfSpan::new("kernel_start");
        let count = self.factory.load()?;
        tracing::info!(target: "walnut_kernel", prototypes = count, "kernel started");
        Ok(count)
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn factory(&self) -> &ModuleFactory {
        &self.factory
    }

    pub fn root_container(&self) -> &ModuleContainer {
        &self.root
    }

    /// Create a module from the named prototype, add it to the root container
    /// and start it.
    pub fn apply_module(&self, prototype: &str) -> KernelResult<Arc<dyn Module>> {
        let prototype = self.factory.get_prototype_by_name(prototype)?;
        let module = self.factory.create(&prototype)?;
        self.root.add(module.clone(), true)?;
        Ok(module)
    }

    /// Run a combiner against the root container.
    pub fn apply(&self, combiner: &dyn ModuleCombiner) -> KernelResult<CombinerReport> {
        combiner.apply(&self.factory, &self.root)
    }

    /// Load a project file into the root container.
    ///
    /// Only failures to read or (in strict mode) parse the file are errors;
    /// everything else ends up in the report.
    pub fn load_project(&self, path: impl AsRef<Path>) -> KernelResult<CombinerReport> {
        let path = path.as_ref();
        let file = ProjectFile::read(path, self.config.project.parse_mode)?;
        tracing::info!(
            target: "walnut_kernel::project",
            path = %path.display(),
            records = file.records().len(),
            "loading project"
        );
        self.apply_project(file)
    }

    /// Apply already parsed project text to the root container.
    pub fn load_project_str(&self, text: &str) -> KernelResult<CombinerReport> {
        let file = ProjectFile::parse(text, self.config.project.parse_mode)?;
        self.apply_project(file)
    }

    fn apply_project(&self, file: ProjectFile) -> KernelResult<CombinerReport> {
        let combiner = ProjectFileCombiner::new(file).data_module(&self.config.project.data_module);
        self.apply(&combiner)
    }

    /// Save the root container's graph.
    pub fn save_project(&self, path: impl AsRef<Path>) -> KernelResult<()> {
        let path = path.as_ref();
        let file = ProjectFile::from_container(&self.root);
        file.write(path)?;
        tracing::info!(
            target: "walnut_kernel::project",
            path = %path.display(),
            records = file.records().len(),
            "saved project"
        );
        Ok(())
    }

    /// Stop every module of the root container.
    pub fn shutdown(&self) {
        tracing::info!(target: "walnut_kernel", "kernel shutting down");
        self.root.stop();
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .field("factory", &self.factory)
            .field("root", &self.root)
            .finish()
    }
}

/// Builder for [`Kernel`].
pub struct KernelBuilder {
    config: KernelConfig,
    factory: ModuleFactoryBuilder,
    loader: ModuleLoader,
}

impl KernelBuilder {
    /// Register a statically known prototype.
    pub fn builtin(mut self, prototype: Arc<dyn Module>) -> Self {
        self.factory = self.factory.builtin(prototype);
        self
    }

    /// Register a module library.
    pub fn provider(mut self, provider: impl PrototypeProvider + 'static) -> Self {
        self.loader = self.loader.provider(provider);
        self
    }

    pub fn build(self) -> Kernel {
        let loader = self
            .loader
            .search_paths(self.config.module_search_paths.iter().cloned());
        let root = ModuleContainer::with_threads(
            "Root",
            "Root module container",
            self.config.threads.clone(),
        )
        .crash_if_module_crashes(self.config.crash_if_module_crashes);
        Kernel {
            factory: self.factory.loader(loader).build(),
            root,
            config: self.config,
        }
    }
}
