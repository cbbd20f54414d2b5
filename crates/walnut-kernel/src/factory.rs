//! The prototype registry.
//!
//! The [`ModuleFactory`] owns one prototype per module kind. Prototypes are
//! initialized but never run; live modules are created from them with
//! [`ModuleFactory::create`]. The registry is a shared associative container,
//! so readers walk it through read tickets and every mutation happens under a
//! single write ticket.
//!
//! The factory is not a global. The [`Kernel`](crate::Kernel) owns one and
//! hands out references.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use walnut_core::shared::{ReadTicket, SharedAssociativeContainer};

use crate::combiner::{ApplyCombiner, CompatiblesGroup};
use crate::error::{KernelError, KernelResult};
use crate::loader::{ModuleLoader, PrototypeProvider};
use crate::module::{Module, initialize_module};

/// Registry of module prototypes.
pub struct ModuleFactory {
    prototypes: SharedAssociativeContainer<String, Arc<dyn Module>>,
    builtins: Vec<Arc<dyn Module>>,
    loader: ModuleLoader,
}

impl ModuleFactory {
    /// A factory without built-ins or providers.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ModuleFactoryBuilder {
        ModuleFactoryBuilder::default()
    }

    /// Populate the registry with the built-ins and the loader's prototypes.
    ///
    /// All names are checked against each other and against the registry
    /// before anything is inserted; a duplicate aborts the load with
    /// [`KernelError::PrototypeNotUnique`] and leaves the registry untouched.
    /// Each new prototype is then initialized exactly once. Returns the number
    /// of prototypes added.
    #[tracing::instrument(skip_all, target = "walnut_kernel::factory", level = "trace")]
    pub fn load(&self) -> KernelResult<usize> {
        let mut candidates = self.builtins.clone();
        candidates.extend(self.loader.load()?);

        let mut ticket = self.prototypes.get_write_ticket_silent();
        let mut seen = HashSet::new();
        for candidate in &candidates {
            let name = candidate.name();
            if ticket.contains_key(name) || !seen.insert(name) {
                tracing::error!(
                    target: "walnut_kernel::factory",
                    prototype = name,
                    "prototype name is not unique, load aborted"
                );
                return Err(KernelError::PrototypeNotUnique {
                    name: name.to_string(),
                });
            }
        }

        for candidate in &candidates {
            initialize_module(candidate.as_ref())?;
        }

        let count = candidates.len();
        for candidate in candidates {
            tracing::debug!(
                target: "walnut_kernel::factory",
                prototype = candidate.name(),
                "registered prototype"
            );
            ticket.insert(candidate.name().to_string(), candidate);
        }
        drop(ticket);
        self.prototypes.change_condition().notify();

        tracing::info!(
            target: "walnut_kernel::factory",
            count,
            total = self.prototypes.len(),
            "loaded module prototypes"
        );
        Ok(count)
    }

    /// The prototype named `name`, if registered.
    pub fn is_prototype_available(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.prototypes.get_cloned(&name.to_string())
    }

    /// The prototype named `name`.
    pub fn get_prototype_by_name(&self, name: &str) -> KernelResult<Arc<dyn Module>> {
        self.is_prototype_available(name)
            .ok_or_else(|| KernelError::unknown_prototype(name))
    }

    /// The prototype a live module was created from.
    pub fn get_prototype_by_instance(&self, instance: &dyn Module) -> KernelResult<Arc<dyn Module>> {
        self.get_prototype_by_name(instance.name())
    }

    /// Whether `module` is one of the registered prototypes, as opposed to a
    /// live instance.
    pub fn is_prototype(&self, module: &Arc<dyn Module>) -> bool {
        self.prototypes
            .get_read_ticket()
            .values()
            .any(|prototype| Arc::ptr_eq(prototype, module))
    }

    /// Read access to the registry, keyed and ordered by name.
    pub fn get_prototypes(&self) -> ReadTicket<'_, BTreeMap<String, Arc<dyn Module>>> {
        self.prototypes.get_read_ticket()
    }

    /// Number of registered prototypes.
    pub fn prototype_count(&self) -> usize {
        self.prototypes.len()
    }

    /// Create a new, initialized instance from a registered prototype.
    pub fn create(&self, prototype: &Arc<dyn Module>) -> KernelResult<Arc<dyn Module>> {
        if !self.is_prototype(prototype) {
            return Err(KernelError::unknown_prototype(prototype.name()));
        }

        let module = prototype.factory();
        module.base().set_local_path(prototype.base().local_path());
        initialize_module(module.as_ref())?;

        tracing::debug!(
            target: "walnut_kernel::factory",
            prototype = prototype.name(),
            "created module"
        );
        Ok(module)
    }

    /// Prototypes that can follow `module` in a graph, or start a new graph
    /// when `module` is `None`.
    ///
    /// Prototypes without inputs can always start a graph and are listed with
    /// a single unconnected combiner. For a given module, every pair of one of
    /// its outputs and a compatible prototype input yields a connecting
    /// combiner. Groups are ordered by prototype name, combiners by connector
    /// names, so repeated calls return identical lists.
    pub fn get_compatible_prototypes(&self, module: Option<&Arc<dyn Module>>) -> Vec<CompatiblesGroup> {
        let ticket = self.prototypes.get_read_ticket();
        let mut groups = Vec::new();

        for prototype in ticket.values() {
            let inputs = prototype.base().inputs();
            if inputs.is_empty() {
                groups.push(CompatiblesGroup::new(
                    prototype.clone(),
                    vec![ApplyCombiner::new(prototype.clone())],
                ));
                continue;
            }
            let Some(source) = module else {
                continue;
            };

            let mut combiners = Vec::new();
            for output in source.base().outputs() {
                for input in &inputs {
                    if output.is_compatible(input) {
                        combiners.push(ApplyCombiner::connecting(
                            source.clone(),
                            output.name(),
                            prototype.clone(),
                            input.name(),
                        ));
                    }
                }
            }
            if !combiners.is_empty() {
                combiners.sort_by(|a, b| {
                    (a.source_connector(), a.target_connector())
                        .cmp(&(b.source_connector(), b.target_connector()))
                });
                groups.push(CompatiblesGroup::new(prototype.clone(), combiners));
            }
        }

        groups.sort_by(|a, b| a.prototype().name().cmp(b.prototype().name()));
        groups
    }
}

impl Default for ModuleFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModuleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleFactory")
            .field(
                "prototypes",
                &self.prototypes.with_read(|p| p.keys().cloned().collect::<Vec<_>>()),
            )
            .field("loader", &self.loader)
            .finish()
    }
}

/// Builder for [`ModuleFactory`].
#[derive(Default)]
pub struct ModuleFactoryBuilder {
    builtins: Vec<Arc<dyn Module>>,
    loader: ModuleLoader,
}

impl ModuleFactoryBuilder {
    /// Register a statically known prototype.
    pub fn builtin(mut self, prototype: Arc<dyn Module>) -> Self {
        self.builtins.push(prototype);
        self
    }

    /// Use `loader` to discover further prototypes.
    pub fn loader(mut self, loader: ModuleLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Register a provider with the loader.
    pub fn provider(mut self, provider: impl PrototypeProvider + 'static) -> Self {
        self.loader = self.loader.provider(provider);
        self
    }

    pub fn build(self) -> ModuleFactory {
        ModuleFactory {
            prototypes: SharedAssociativeContainer::new(BTreeMap::new()),
            builtins: self.builtins,
            loader: self.loader,
        }
    }
}

static_assertions::assert_impl_all!(ModuleFactory: Send, Sync);
