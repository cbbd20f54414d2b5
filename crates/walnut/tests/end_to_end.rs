//! The property system and the kernel used together through the prelude.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use walnut::kernel::{DATA_MODULE_NAME, FileDataset};
use walnut::prelude::*;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("walnut_kernel=debug")
        .with_test_writer()
        .try_init();
}

#[test]
fn test_property_walkthrough() {
    let root = PropertyGroup::new("root", "");
    let x: PropInt = root.add_property("x", "", 5).unwrap();
    x.set_min(0);
    x.set_max(10);

    assert!(!x.set(15));
    assert_eq!(x.get(), 5);
    assert!(x.set(7));
    assert_eq!(x.get(), 7);

    let found = root.get_property("x").unwrap().downcast::<i32>().unwrap();
    assert!(Arc::ptr_eq(&found, &x));
}

/// Counts the files it receives.
struct Inventory {
    base: ModuleBase,
    input: InputData<FileDataset>,
    seen: Arc<PropertyVariable<i32>>,
}

impl Inventory {
    fn new() -> Self {
        let base = ModuleBase::new("Inventory", "Counts incoming datasets");
        Self {
            input: InputData::new(base.name(), "in", ""),
            seen: Arc::new(PropertyVariable::new("seen", "Datasets received", 0)),
            base,
        }
    }
}

impl Module for Inventory {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn factory(&self) -> Arc<dyn Module> {
        Arc::new(Inventory::new())
    }

    fn connectors(&self) -> KernelResult<()> {
        self.base.add_connector(self.input.connector().clone())
    }

    fn properties(&self) -> KernelResult<()> {
        self.base.information().add_existing(self.seen.clone())?;
        Ok(())
    }

    fn module_main(&self) -> Result<(), ModuleError> {
        self.base.ready();
        while !self.base.shutdown_requested() {
            self.base.module_state().wait();
            if self.input.get_data().is_some() {
                self.seen.set(self.seen.get() + 1);
            }
        }
        Ok(())
    }
}

#[test]
fn test_data_flows_from_project_to_module() {
    init_logging();
    let kernel = Kernel::builder(KernelConfig::default())
        .builtin(Arc::new(Inventory::new()))
        .build();
    kernel.start().unwrap();

    let report = kernel
        .load_project_str(
            "DATA:0:/data/a.nii\n\
             MODULE:1:Inventory\n\
             CONNECTION:(0,out)->(1,in)\n",
        )
        .unwrap();
    assert!(report.is_clean(), "{report:?}");

    let inventory = kernel.root_container().find_module("Inventory").unwrap();
    let seen = inventory
        .base()
        .information()
        .get_typed::<i32>("seen")
        .unwrap();

    let (tx, rx) = mpsc::channel();
    let probe = seen.clone();
    let _subscription = seen.update_condition().subscribe_signal(move || {
        let _ = tx.send(probe.get());
    });
    if seen.get() == 0 {
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap() >= 1);
    }

    let data = kernel.root_container().find_module(DATA_MODULE_NAME).unwrap();
    assert_eq!(
        data.data_filename().as_deref(),
        Some(std::path::Path::new("/data/a.nii"))
    );
    assert!(
        data.base()
            .properties()
            .get_property("filename")
            .unwrap()
            .set_as_string("/data/b.nii")
    );
    let before = seen.get();
    while seen.get() <= before {
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    kernel.shutdown();
}
