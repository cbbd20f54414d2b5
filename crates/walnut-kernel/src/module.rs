//! Modules: the processing units of the dataflow graph.
//!
//! A module implements [`Module`] and embeds a [`ModuleBase`] carrying
//! everything the kernel needs: its property tree, connectors, lifecycle flags
//! and the condition set its thread blocks on.
//!
//! # Lifecycle
//!
//! 1. Construction (a prototype, or [`Module::factory`] on a prototype).
//! 2. [`initialize_module`] calls the [`Module::connectors`] and
//!    [`Module::properties`] hooks, exactly once.
//! 3. [`start_module`] runs [`Module::module_main`] on a dedicated, named
//!    thread. The body calls [`ModuleBase::ready`] once it is usable and
//!    loops on [`ModuleBase::module_state`] until shutdown is requested.
//! 4. [`ModuleBase::request_stop`] and [`ModuleBase::join`] end it.
//!
//! An error returned from `module_main`, or a panic inside it, marks the
//! module as crashed. Crashes never leave the module thread.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use walnut_kernel::module::{Module, ModuleBase};
//! use walnut_kernel::ModuleError;
//!
//! struct Idle {
//!     base: ModuleBase,
//! }
//!
//! impl Idle {
//!     fn new() -> Self {
//!         Self { base: ModuleBase::new("Idle", "Does nothing until stopped") }
//!     }
//! }
//!
//! impl Module for Idle {
//!     fn base(&self) -> &ModuleBase {
//!         &self.base
//!     }
//!
//!     fn factory(&self) -> Arc<dyn Module> {
//!         Arc::new(Idle::new())
//!     }
//!
//!     fn module_main(&self) -> Result<(), ModuleError> {
//!         self.base.ready();
//!         self.base.wait_for_stop();
//!         Ok(())
//!     }
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};
use walnut_core::property::{PropBool, PropertyGroup, PropertyPurpose, PropertyVariable};
use walnut_core::{Condition, ConditionSet, Flag, Property, Signal};

use crate::config::ThreadConfig;
use crate::connector::{Connector, ConnectorDirection};
use crate::error::{KernelError, KernelResult, ModuleError};

/// A processing unit of the dataflow graph.
pub trait Module: Send + Sync + 'static {
    /// The embedded kernel state.
    fn base(&self) -> &ModuleBase;

    /// Create a fresh, uninitialized instance of the same module.
    fn factory(&self) -> Arc<dyn Module>;

    /// Declare connectors through [`ModuleBase::add_connector`].
    fn connectors(&self) -> KernelResult<()> {
        Ok(())
    }

    /// Declare properties on [`ModuleBase::properties`].
    fn properties(&self) -> KernelResult<()> {
        Ok(())
    }

    /// The thread body.
    fn module_main(&self) -> Result<(), ModuleError>;

    /// The file a data source module reads, written as a `DATA` project record.
    fn data_filename(&self) -> Option<PathBuf> {
        None
    }

    fn name(&self) -> &str {
        self.base().name()
    }

    fn description(&self) -> &str {
        self.base().description()
    }
}

/// How a started module ended its startup phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStartState {
    /// The module called `ready()`.
    Ready,
    /// The module failed or panicked.
    Crashed,
    /// The thread ended without becoming ready.
    Finished,
}

/// Kernel state embedded in every module.
pub struct ModuleBase {
    name: String,
    description: String,
    properties: Arc<PropertyGroup>,
    information: Arc<PropertyGroup>,
    active: PropBool,
    lifecycle: Condition,
    initialized: Flag<bool>,
    ready: Flag<bool>,
    crashed: Flag<bool>,
    running: Flag<bool>,
    shutdown: Flag<bool>,
    module_state: ConditionSet,
    inputs: RwLock<Vec<Arc<Connector>>>,
    outputs: RwLock<Vec<Arc<Connector>>>,
    local_path: RwLock<PathBuf>,
    last_error: RwLock<Option<String>>,
    associated: AtomicBool,
    init_lock: Mutex<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
    ready_signal: Signal<()>,
    error_signal: Signal<String>,
}

impl ModuleBase {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let lifecycle = Condition::new();
        let shutdown = Flag::new(false);
        let module_state = ConditionSet::new();
        module_state.add(shutdown.condition());
        module_state.set_resetable(true, true);

        let information = Arc::new(PropertyGroup::new(
            "Information",
            "Read-only information about the module",
        ));
        information.set_purpose(PropertyPurpose::Information);

        Self {
            name: name.into(),
            description: description.into(),
            properties: Arc::new(PropertyGroup::new("Properties", "Module parameters")),
            information,
            active: Arc::new(PropertyVariable::new(
                "active",
                "Whether the module is active",
                true,
            )),
            initialized: Flag::new(false),
            ready: Flag::with_condition(false, lifecycle.clone()),
            crashed: Flag::with_condition(false, lifecycle.clone()),
            running: Flag::with_condition(false, lifecycle.clone()),
            lifecycle,
            shutdown,
            module_state,
            inputs: RwLock::new(Vec::new()),
            outputs: RwLock::new(Vec::new()),
            local_path: RwLock::new(PathBuf::new()),
            last_error: RwLock::new(None),
            associated: AtomicBool::new(false),
            init_lock: Mutex::new(()),
            thread: Mutex::new(None),
            ready_signal: Signal::new(),
            error_signal: Signal::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Root of the module's parameters.
    pub fn properties(&self) -> &Arc<PropertyGroup> {
        &self.properties
    }

    /// Read-only information published by the module.
    pub fn information(&self) -> &Arc<PropertyGroup> {
        &self.information
    }

    /// The built-in `active` property.
    ///
    /// Advisory: the kernel saves and restores it with the other properties
    /// but never acts on it. Module bodies decide what an inactive module
    /// skips.
    pub fn active(&self) -> &PropBool {
        &self.active
    }

    /// The condition set the module thread blocks on.
    ///
    /// It contains the shutdown flag's condition and the data-changed
    /// condition of every input connector. Add property conditions as needed.
    /// The set remembers fires and resets itself when `wait()` returns.
    pub fn module_state(&self) -> &ConditionSet {
        &self.module_state
    }

    // Connectors

    /// Register a connector. Input connectors join the module's wait set.
    pub fn add_connector(&self, connector: Arc<Connector>) -> KernelResult<()> {
        if self.find_connector(connector.name()).is_some() {
            return Err(KernelError::ConnectorNameCollision {
                module: self.name.clone(),
                connector: connector.name().to_string(),
            });
        }
        match connector.direction() {
            ConnectorDirection::Input => {
                self.module_state.add(connector.data_changed());
                self.inputs.write().push(connector);
            }
            ConnectorDirection::Output => self.outputs.write().push(connector),
        }
        Ok(())
    }

    /// Forget every property and connector declared so far.
    fn discard_declarations(&self) {
        self.properties.clear();
        self.information.clear();
        for input in self.inputs.write().drain(..) {
            self.module_state.remove(input.data_changed());
        }
        self.outputs.write().clear();
    }

    pub fn inputs(&self) -> Vec<Arc<Connector>> {
        self.inputs.read().clone()
    }

    pub fn outputs(&self) -> Vec<Arc<Connector>> {
        self.outputs.read().clone()
    }

    pub fn find_input_connector(&self, name: &str) -> Option<Arc<Connector>> {
        self.inputs.read().iter().find(|c| c.name() == name).cloned()
    }

    pub fn find_output_connector(&self, name: &str) -> Option<Arc<Connector>> {
        self.outputs.read().iter().find(|c| c.name() == name).cloned()
    }

    /// Find a connector of either direction.
    pub fn find_connector(&self, name: &str) -> Option<Arc<Connector>> {
        self.find_input_connector(name)
            .or_else(|| self.find_output_connector(name))
    }

    pub fn get_input_connector(&self, name: &str) -> KernelResult<Arc<Connector>> {
        self.find_input_connector(name)
            .ok_or_else(|| KernelError::connector_not_found(&self.name, name))
    }

    pub fn get_output_connector(&self, name: &str) -> KernelResult<Arc<Connector>> {
        self.find_output_connector(name)
            .ok_or_else(|| KernelError::connector_not_found(&self.name, name))
    }

    pub fn get_connector(&self, name: &str) -> KernelResult<Arc<Connector>> {
        self.find_connector(name)
            .ok_or_else(|| KernelError::connector_not_found(&self.name, name))
    }

    /// Disconnect every connector of this module.
    pub fn disconnect_all(&self) {
        for connector in self.inputs().iter().chain(self.outputs().iter()) {
            connector.disconnect_all();
        }
    }

    // State

    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed.get()
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Whether the module was asked to stop.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.get()
    }

    /// The shutdown flag. Its condition is part of the module's wait set.
    pub fn shutdown_flag(&self) -> &Flag<bool> {
        &self.shutdown
    }

    /// Fired whenever the ready, crashed or running state changes.
    pub fn lifecycle_condition(&self) -> &Condition {
        &self.lifecycle
    }

    /// Announce that the module is set up and usable.
    pub fn ready(&self) {
        if self.ready.set(true) {
            tracing::debug!(target: "walnut_kernel::module", module = %self.name, "module ready");
            self.ready_signal.emit(());
        }
    }

    /// Record a crash. The module thread usually ends right after.
    pub fn crash(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(
            target: "walnut_kernel::module",
            module = %self.name,
            error = %message,
            "module crashed"
        );
        *self.last_error.write() = Some(message.clone());
        self.crashed.set(true);
        self.error_signal.emit(message);
    }

    /// The message of the last crash.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Ask the module thread to end its loop.
    pub fn request_stop(&self) {
        self.shutdown.set(true);
    }

    /// Block until shutdown is requested.
    pub fn wait_for_stop(&self) {
        self.shutdown.wait_for_value(&true);
    }

    /// Block until the module is ready, crashed, or its thread has ended.
    ///
    /// Returns [`ModuleStartState::Finished`] right away for a module that was
    /// never started.
    pub fn wait_ready_or_crashed(&self) -> ModuleStartState {
        self.lifecycle
            .wait_until(|| self.is_crashed() || self.is_ready() || !self.is_running());
        if self.is_crashed() {
            ModuleStartState::Crashed
        } else if self.is_ready() {
            ModuleStartState::Ready
        } else {
            ModuleStartState::Finished
        }
    }

    /// Join the module thread, if it was started and not joined yet.
    pub fn join(&self) {
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::warn!(target: "walnut_kernel::module", module = %self.name, "module thread panicked");
        }
    }

    /// Emitted when the module becomes ready.
    pub fn on_ready(&self) -> &Signal<()> {
        &self.ready_signal
    }

    /// Emitted with the error message when the module crashes.
    pub fn on_error(&self) -> &Signal<String> {
        &self.error_signal
    }

    // Metadata

    /// Directory the module was loaded from.
    pub fn local_path(&self) -> PathBuf {
        self.local_path.read().clone()
    }

    pub fn set_local_path(&self, path: impl AsRef<Path>) {
        *self.local_path.write() = path.as_ref().to_path_buf();
    }

    /// Whether the module belongs to a container.
    pub fn is_associated(&self) -> bool {
        self.associated.load(Ordering::SeqCst)
    }

    /// Claim or release container membership. Claiming fails if already claimed.
    pub(crate) fn set_associated(&self, associated: bool) -> bool {
        if associated {
            self.associated
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        } else {
            self.associated.store(false, Ordering::SeqCst);
            true
        }
    }
}

impl fmt::Debug for ModuleBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleBase")
            .field("name", &self.name)
            .field("initialized", &self.is_initialized())
            .field("ready", &self.is_ready())
            .field("crashed", &self.is_crashed())
            .field("running", &self.is_running())
            .field("inputs", &self.inputs.read().len())
            .field("outputs", &self.outputs.read().len())
            .finish()
    }
}

/// Run the declaration hooks of a module. Allowed once per module.
///
/// If a hook fails, everything declared so far is discarded and the module
/// stays uninitialized, so the call may be retried.
pub fn initialize_module(module: &dyn Module) -> KernelResult<()> {
    let base = module.base();
    let _guard = base.init_lock.lock();
    if base.is_initialized() {
        return Err(KernelError::AlreadyInitialized {
            name: base.name.clone(),
        });
    }

    base.properties.add_existing(base.active.clone())?;
    if let Err(err) = module.connectors().and_then(|()| module.properties()) {
        base.discard_declarations();
        tracing::debug!(target: "walnut_kernel::module", module = %base.name, %err, "module declaration failed");
        return Err(err);
    }
    base.initialized.set(true);

    tracing::trace!(target: "walnut_kernel::module", module = %base.name, "module initialized");
    Ok(())
}

/// Start the thread of an initialized module.
///
/// Starting a module whose thread was already started is a no-op.
pub fn start_module(module: &Arc<dyn Module>, threads: &ThreadConfig) -> KernelResult<()> {
    let base = module.base();
    if !base.is_initialized() {
        return Err(KernelError::ModuleNotInitialized {
            name: base.name.clone(),
        });
    }

    let mut slot = base.thread.lock();
    if slot.is_some() {
        return Ok(());
    }

    base.running.set(true);
    let mut builder = thread::Builder::new().name(threads.thread_name(&base.name));
    if let Some(stack_size) = threads.stack_size {
        builder = builder.stack_size(stack_size);
    }

    let thread_module = Arc::clone(module);
    match builder.spawn(move || run_module(thread_module)) {
        Ok(handle) => {
            *slot = Some(handle);
            tracing::debug!(target: "walnut_kernel::module", module = %base.name, "module thread started");
            Ok(())
        }
        Err(source) => {
            base.running.set(false);
            Err(KernelError::ThreadSpawn {
                name: base.name.clone(),
                source,
            })
        }
    }
}

/// Request shutdown and join the thread.
pub fn stop_module(module: &dyn Module) {
    let base = module.base();
    base.request_stop();
    base.join();
}

fn run_module(module: Arc<dyn Module>) {
    let base = module.base();
    let span = tracing::info_span!(target: "walnut_kernel::module", "walnut::module", module = %base.name);
    let _entered = span.enter();

    match panic::catch_unwind(AssertUnwindSafe(|| module.module_main())) {
        Ok(Ok(())) => {
            tracing::debug!(target: "walnut_kernel::module", "module finished");
        }
        Ok(Err(err)) => base.crash(err.to_string()),
        Err(payload) => base.crash(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
    base.running.set(false);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

static_assertions::assert_impl_all!(ModuleBase: Send, Sync);
