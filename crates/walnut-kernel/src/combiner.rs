//! Combiners: recipes that build or extend a module graph.
//!
//! A combiner instantiates modules from prototypes, adds them to a container,
//! waits for them to come up, configures and connects them. Problems with
//! single modules, properties or connections do not abort a combiner; they
//! are collected as [`CombinerWarning`]s in the returned [`CombinerReport`].

use std::fmt;
use std::sync::Arc;

use crate::container::ModuleContainer;
use crate::error::KernelResult;
use crate::factory::ModuleFactory;
use crate::module::{Module, ModuleStartState};

/// Something that went wrong while applying a combiner, without stopping it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CombinerWarning {
    /// A module could not be created or added.
    #[error("module {module} was not created: {reason}")]
    ModuleNotCreated { module: String, reason: String },

    /// A module crashed, or ended, instead of becoming ready.
    #[error("module {module} did not become ready: {reason}")]
    ModuleCrashed { module: String, reason: String },

    /// A property value was not applied.
    #[error("property {property} of module {module} skipped: {reason}")]
    PropertySkipped {
        module: String,
        property: String,
        reason: String,
    },

    /// A connection was not made.
    #[error("connection {from} -> {to} skipped: {reason}")]
    ConnectionSkipped {
        from: String,
        to: String,
        reason: String,
    },

    /// A project file line was not understood.
    #[error("line {line} skipped: '{content}'")]
    LineSkipped { line: usize, content: String },
}

/// Outcome of applying a combiner.
#[derive(Default)]
pub struct CombinerReport {
    modules: Vec<Arc<dyn Module>>,
    warnings: Vec<CombinerWarning>,
}

impl CombinerReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modules that came up ready, in creation order. Crashed modules are
    /// only reported as warnings.
    pub fn modules(&self) -> &[Arc<dyn Module>] {
        &self.modules
    }

    pub fn warnings(&self) -> &[CombinerWarning] {
        &self.warnings
    }

    /// Whether everything was applied.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub(crate) fn push_module(&mut self, module: Arc<dyn Module>) {
        self.modules.push(module);
    }

    pub(crate) fn warn(&mut self, warning: CombinerWarning) {
        tracing::warn!(target: "walnut_kernel::project", "{warning}");
        self.warnings.push(warning);
    }
}

impl fmt::Debug for CombinerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinerReport")
            .field(
                "modules",
                &self.modules.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("warnings", &self.warnings)
            .finish()
    }
}

/// A recipe applied to a container.
pub trait ModuleCombiner {
    /// Run the recipe. Only failures that prevent any progress are errors.
    fn apply(&self, factory: &ModuleFactory, container: &ModuleContainer) -> KernelResult<CombinerReport>;
}

/// Why a started module is unusable, or `None` if it is ready.
pub(crate) fn startup_failure(module: &dyn Module) -> Option<String> {
    match module.base().wait_ready_or_crashed() {
        ModuleStartState::Ready => None,
        ModuleStartState::Crashed => Some(
            module
                .base()
                .last_error()
                .unwrap_or_else(|| "crashed".to_string()),
        ),
        ModuleStartState::Finished => Some("finished before becoming ready".to_string()),
    }
}

/// Creates one module from a prototype and optionally connects an output of
/// an existing module to one of its inputs.
#[derive(Clone)]
pub struct ApplyCombiner {
    prototype: Arc<dyn Module>,
    source: Option<(Arc<dyn Module>, String)>,
    target_connector: Option<String>,
}

impl ApplyCombiner {
    /// Create the module without connecting it.
    pub fn new(prototype: Arc<dyn Module>) -> Self {
        Self {
            prototype,
            source: None,
            target_connector: None,
        }
    }

    /// Create the module and connect `source:source_connector` to
    /// `target_connector` of the new module.
    pub fn connecting(
        source: Arc<dyn Module>,
        source_connector: impl Into<String>,
        prototype: Arc<dyn Module>,
        target_connector: impl Into<String>,
    ) -> Self {
        Self {
            prototype,
            source: Some((source, source_connector.into())),
            target_connector: Some(target_connector.into()),
        }
    }

    pub fn prototype(&self) -> &Arc<dyn Module> {
        &self.prototype
    }

    pub fn source(&self) -> Option<&Arc<dyn Module>> {
        self.source.as_ref().map(|(module, _)| module)
    }

    pub fn source_connector(&self) -> Option<&str> {
        self.source.as_ref().map(|(_, name)| name.as_str())
    }

    pub fn target_connector(&self) -> Option<&str> {
        self.target_connector.as_deref()
    }
}

impl ModuleCombiner for ApplyCombiner {
    fn apply(&self, factory: &ModuleFactory, container: &ModuleContainer) -> KernelResult<CombinerReport> {
        let module = factory.create(&self.prototype)?;
        container.add(module.clone(), true)?;

        let mut report = CombinerReport::new();
        if let Some(reason) = startup_failure(module.as_ref()) {
            report.warn(CombinerWarning::ModuleCrashed {
                module: module.name().to_string(),
                reason,
            });
            return Ok(report);
        }
        report.push_module(module.clone());

        if let (Some((source, source_connector)), Some(target_connector)) =
            (&self.source, &self.target_connector)
        {
            let connected = source
                .base()
                .get_output_connector(source_connector)
                .and_then(|output| {
                    let input = module.base().get_input_connector(target_connector)?;
                    output.connect(&input)
                });
            if let Err(err) = connected {
                report.warn(CombinerWarning::ConnectionSkipped {
                    from: format!("{}:{}", source.name(), source_connector),
                    to: format!("{}:{}", module.name(), target_connector),
                    reason: err.to_string(),
                });
            }
        }
        Ok(report)
    }
}

impl fmt::Debug for ApplyCombiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplyCombiner")
            .field("prototype", &self.prototype.name())
            .field("source", &self.source().map(|m| m.name()))
            .field("source_connector", &self.source_connector())
            .field("target_connector", &self.target_connector())
            .finish()
    }
}

/// The combiners offered for one prototype.
#[derive(Clone)]
pub struct CompatiblesGroup {
    prototype: Arc<dyn Module>,
    combiners: Vec<ApplyCombiner>,
}

impl CompatiblesGroup {
    pub fn new(prototype: Arc<dyn Module>, combiners: Vec<ApplyCombiner>) -> Self {
        Self {
            prototype,
            combiners,
        }
    }

    pub fn prototype(&self) -> &Arc<dyn Module> {
        &self.prototype
    }

    pub fn combiners(&self) -> &[ApplyCombiner] {
        &self.combiners
    }
}

impl fmt::Debug for CompatiblesGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompatiblesGroup")
            .field("prototype", &self.prototype.name())
            .field("combiners", &self.combiners)
            .finish()
    }
}
