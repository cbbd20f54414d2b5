//! Small modules used by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use walnut_core::Property;
use walnut_core::property::{PropertyGroup, PropertyVariable};
use walnut_kernel::{
    FnProvider, InputData, Kernel, KernelConfig, KernelResult, Module, ModuleBase, ModuleError,
    OutputData,
};

/// Publishes the value of its `value` property.
pub struct Source {
    base: ModuleBase,
    value: Arc<PropertyVariable<i32>>,
    output: OutputData<i32>,
}

impl Source {
    pub fn new() -> Self {
        let base = ModuleBase::new("Source", "Publishes a constant");
        Self {
            value: Arc::new(PropertyVariable::new("value", "Published value", 1)),
            output: OutputData::new(base.name(), "out", ""),
            base,
        }
    }
}

impl Module for Source {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn factory(&self) -> Arc<dyn Module> {
        Arc::new(Source::new())
    }

    fn connectors(&self) -> KernelResult<()> {
        self.base.add_connector(self.output.connector().clone())
    }

    fn properties(&self) -> KernelResult<()> {
        self.base.properties().add_existing(self.value.clone())?;
        self.base.module_state().add(self.value.update_condition());
        Ok(())
    }

    fn module_main(&self) -> Result<(), ModuleError> {
        self.base.ready();
        while !self.base.shutdown_requested() {
            self.output.update_data(Arc::new(self.value.get()));
            self.base.module_state().wait();
        }
        Ok(())
    }
}

/// Multiplies its input by `settings/factor`.
pub struct Scale {
    base: ModuleBase,
    settings: Arc<PropertyGroup>,
    factor: Arc<PropertyVariable<i32>>,
    input: InputData<i32>,
    output: OutputData<i32>,
}

impl Scale {
    pub fn new() -> Self {
        let base = ModuleBase::new("Scale", "Multiplies its input");
        Self {
            settings: Arc::new(PropertyGroup::new("settings", "")),
            factor: Arc::new(PropertyVariable::new("factor", "", 2)),
            input: InputData::new(base.name(), "in", ""),
            output: OutputData::new(base.name(), "out", ""),
            base,
        }
    }
}

impl Module for Scale {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn factory(&self) -> Arc<dyn Module> {
        Arc::new(Scale::new())
    }

    fn connectors(&self) -> KernelResult<()> {
        self.base.add_connector(self.input.connector().clone())?;
        self.base.add_connector(self.output.connector().clone())
    }

    fn properties(&self) -> KernelResult<()> {
        self.settings.add_existing(self.factor.clone())?;
        self.base.properties().add_existing(self.settings.clone())?;
        self.base.module_state().add(self.settings.update_condition());
        Ok(())
    }

    fn module_main(&self) -> Result<(), ModuleError> {
        self.base.ready();
        while !self.base.shutdown_requested() {
            match self.input.get_data() {
                Some(value) => self.output.update_data(Arc::new(*value * self.factor.get())),
                None => self.output.clear_data(),
            }
            self.base.module_state().wait();
        }
        Ok(())
    }
}

/// Has an input and an output like [`Scale`], but fails on startup.
pub struct Crasher {
    base: ModuleBase,
    input: InputData<i32>,
    output: OutputData<i32>,
}

impl Crasher {
    pub fn new() -> Self {
        let base = ModuleBase::new("Crasher", "Fails on startup");
        Self {
            input: InputData::new(base.name(), "in", ""),
            output: OutputData::new(base.name(), "out", ""),
            base,
        }
    }
}

impl Module for Crasher {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn factory(&self) -> Arc<dyn Module> {
        Arc::new(Crasher::new())
    }

    fn connectors(&self) -> KernelResult<()> {
        self.base.add_connector(self.input.connector().clone())?;
        self.base.add_connector(self.output.connector().clone())
    }

    fn module_main(&self) -> Result<(), ModuleError> {
        Err(ModuleError::failed("device not found"))
    }
}

/// A kernel knowing `Source`, `Scale`, `Crasher` and the data module.
pub fn kernel() -> Kernel {
    let kernel = Kernel::builder(KernelConfig::default())
        .builtin(Arc::new(Source::new()))
        .builtin(Arc::new(Scale::new()))
        .provider(FnProvider::new("unstable", || {
            vec![Arc::new(Crasher::new()) as Arc<dyn Module>]
        }))
        .build();
    kernel.start().expect("prototypes load");
    kernel
}

/// Poll `probe` until it yields a value or five seconds pass.
pub fn eventually<T>(mut probe: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = probe() {
            return value;
        }
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}
