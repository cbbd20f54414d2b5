//! Containers of live modules.
//!
//! A [`ModuleContainer`] owns running module instances, starts their threads
//! when they are added and stops and joins them on removal or teardown. The
//! module registry is a shared container: walkers such as the project writer
//! hold a read ticket for as long as they need a consistent view.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use walnut_core::shared::{ReadTicket, SharedObject};
use walnut_core::{Flag, Signal, Subscription};

use crate::config::ThreadConfig;
use crate::error::{KernelError, KernelResult};
use crate::module::{Module, start_module};

new_key_type! {
    /// Key of a module inside its container.
    pub struct ModuleId;
}

/// The registry type behind a container's read tickets.
pub type ModuleMap = SlotMap<ModuleId, Arc<dyn Module>>;

/// A set of live modules.
pub struct ModuleContainer {
    name: String,
    description: String,
    modules: SharedObject<ModuleMap>,
    forwarding: Mutex<SecondaryMap<ModuleId, Vec<Subscription>>>,
    threads: ThreadConfig,
    crash_if_module_crashes: bool,
    crashed: Arc<Flag<bool>>,
    module_added: Signal<String>,
    module_removed: Signal<String>,
    module_ready: Arc<Signal<String>>,
    module_error: Arc<Signal<(String, String)>>,
}

impl ModuleContainer {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::with_threads(name, description, ThreadConfig::default())
    }

    /// A container starting module threads according to `threads`.
    pub fn with_threads(
        name: impl Into<String>,
        description: impl Into<String>,
        threads: ThreadConfig,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            modules: SharedObject::new(SlotMap::with_key()),
            forwarding: Mutex::new(SecondaryMap::new()),
            threads,
            crash_if_module_crashes: false,
            crashed: Arc::new(Flag::new(false)),
            module_added: Signal::new(),
            module_removed: Signal::new(),
            module_ready: Arc::new(Signal::new()),
            module_error: Arc::new(Signal::new()),
        }
    }

    /// Mark the container as crashed whenever one of its modules crashes.
    pub fn crash_if_module_crashes(mut self, enabled: bool) -> Self {
        self.crash_if_module_crashes = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Add an initialized module and optionally start its thread.
    ///
    /// A module can belong to one container only. If the thread cannot be
    /// started, the module is removed again and the error returned.
    pub fn add(&self, module: Arc<dyn Module>, run: bool) -> KernelResult<ModuleId> {
        let base = module.base();
        if !base.is_initialized() {
            return Err(KernelError::ModuleNotInitialized {
                name: module.name().to_string(),
            });
        }
        if !base.set_associated(true) {
            return Err(KernelError::AlreadyAssociated {
                name: module.name().to_string(),
            });
        }

        let subscriptions = self.forward_signals(module.as_ref());
        let id = self.modules.with_write(|modules| modules.insert(module.clone()));
        self.forwarding.lock().insert(id, subscriptions);

        tracing::info!(
            target: "walnut_kernel::container",
            container = %self.name,
            module = module.name(),
            "module added"
        );
        self.module_added.emit(module.name().to_string());

        if run && let Err(err) = start_module(&module, &self.threads) {
            self.detach(id);
            return Err(err);
        }
        Ok(id)
    }

    fn forward_signals(&self, module: &dyn Module) -> Vec<Subscription> {
        let name = module.name().to_string();
        let ready = {
            let signal = self.module_ready.clone();
            let name = name.clone();
            module
                .base()
                .on_ready()
                .connect_scoped(move |_| signal.emit(name.clone()))
        };
        let error = {
            let signal = self.module_error.clone();
            let crashed = self.crash_if_module_crashes.then(|| self.crashed.clone());
            let container = self.name.clone();
            module.base().on_error().connect_scoped(move |message: &String| {
                if let Some(crashed) = &crashed {
                    tracing::error!(
                        target: "walnut_kernel::container",
                        container = %container,
                        module = %name,
                        "container crashed because a module crashed"
                    );
                    crashed.set(true);
                }
                signal.emit((name.clone(), message.clone()));
            })
        };
        vec![ready, error]
    }

    /// Remove a module: disconnect it, stop and join its thread.
    pub fn remove(&self, module: &Arc<dyn Module>) -> KernelResult<()> {
        let id = self.find_id(module).ok_or_else(|| KernelError::NotAssociated {
            name: module.name().to_string(),
            container: self.name.clone(),
        })?;

        module.base().disconnect_all();
        module.base().request_stop();
        module.base().join();
        self.detach(id);
        Ok(())
    }

    fn detach(&self, id: ModuleId) {
        let Some(module) = self.modules.with_write(|modules| modules.remove(id)) else {
            return;
        };
        self.forwarding.lock().remove(id);
        module.base().set_associated(false);

        tracing::info!(
            target: "walnut_kernel::container",
            container = %self.name,
            module = module.name(),
            "module removed"
        );
        self.module_removed.emit(module.name().to_string());
    }

    fn find_id(&self, module: &Arc<dyn Module>) -> Option<ModuleId> {
        self.modules.with_read(|modules| {
            modules
                .iter()
                .find(|(_, candidate)| Arc::ptr_eq(candidate, module))
                .map(|(id, _)| id)
        })
    }

    /// Request shutdown of every module, then join all threads.
    ///
    /// Modules stay in the container. Calling `stop` repeatedly is harmless.
    pub fn stop(&self) {
        let modules = self.module_list();
        if modules.is_empty() {
            return;
        }
        tracing::info!(
            target: "walnut_kernel::container",
            container = %self.name,
            count = modules.len(),
            "stopping modules"
        );
        for module in &modules {
            module.base().request_stop();
        }
        for module in &modules {
            module.base().join();
        }
    }

    /// Read access to the contained modules.
    pub fn modules(&self) -> ReadTicket<'_, ModuleMap> {
        self.modules.get_read_ticket()
    }

    /// Snapshot of the contained modules, in insertion order as long as none
    /// were removed.
    pub fn module_list(&self) -> Vec<Arc<dyn Module>> {
        self.modules
            .with_read(|modules| modules.values().cloned().collect())
    }

    pub fn get_module(&self, id: ModuleId) -> Option<Arc<dyn Module>> {
        self.modules.with_read(|modules| modules.get(id).cloned())
    }

    /// The first module named `name`.
    pub fn find_module(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.with_read(|modules| {
            modules
                .values()
                .find(|module| module.name() == name)
                .cloned()
        })
    }

    pub fn module_count(&self) -> usize {
        self.modules.with_read(|modules| modules.len())
    }

    /// Fired after modules were added or removed.
    pub fn change_condition(&self) -> &walnut_core::Condition {
        self.modules.change_condition()
    }

    /// Whether a module crash was escalated to the container.
    pub fn is_crashed(&self) -> bool {
        self.crashed.get()
    }

    /// Emitted with the module name after a module was added.
    pub fn on_module_added(&self) -> &Signal<String> {
        &self.module_added
    }

    /// Emitted with the module name after a module was removed.
    pub fn on_module_removed(&self) -> &Signal<String> {
        &self.module_removed
    }

    /// Emitted with the module name when a contained module becomes ready.
    pub fn on_module_ready(&self) -> &Signal<String> {
        &self.module_ready
    }

    /// Emitted with module name and message when a contained module crashes.
    pub fn on_module_error(&self) -> &Signal<(String, String)> {
        &self.module_error
    }
}

impl Drop for ModuleContainer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ModuleContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContainer")
            .field("name", &self.name)
            .field("modules", &self.module_count())
            .field("crashed", &self.is_crashed())
            .finish()
    }
}

static_assertions::assert_impl_all!(ModuleContainer: Send, Sync);
