//! Loading and saving project files through the kernel.

mod common;

use std::sync::Arc;

use walnut_kernel::{
    CombinerWarning, InputData, Module, ParseMode, ProjectFile, ProjectRecord,
};

use common::{eventually, kernel};

const PROJECT: &str = "\
// three modules, the second one fails on startup
MODULE:1:Source
MODULE:2:Crasher
MODULE:3:Scale
PROPERTY:(1,value)=4
PROPERTY:(2,active)=0
PROPERTY:(3,settings/factor)=3
CONNECTION:(1,out)->(2,in)
CONNECTION:(1,out)->(3,in)
CONNECTION:(2,out)->(3,in)
";

fn output_of(module: &Arc<dyn Module>) -> InputData<i32> {
    let probe = InputData::<i32>::new("Probe", "in", "");
    module
        .base()
        .get_output_connector("out")
        .unwrap()
        .connect(probe.connector())
        .unwrap();
    probe
}

#[test]
fn test_crashing_module_does_not_stop_the_load() {
    let kernel = kernel();
    let report = kernel.load_project_str(PROJECT).unwrap();

    let names: Vec<_> = report.modules().iter().map(|m| m.name()).collect();
    assert_eq!(names, ["Source", "Scale"]);

    let warnings = report.warnings();
    assert_eq!(warnings.len(), 4, "{warnings:#?}");
    assert!(matches!(
        &warnings[0],
        CombinerWarning::ModuleCrashed { module, reason }
            if module == "#2 (Crasher)" && reason == "device not found"
    ));
    assert!(matches!(
        &warnings[1],
        CombinerWarning::PropertySkipped { module, property, .. }
            if module == "#2" && property == "active"
    ));
    assert!(matches!(
        &warnings[2],
        CombinerWarning::ConnectionSkipped { from, to, .. } if from == "(1,out)" && to == "(2,in)"
    ));
    assert!(matches!(
        &warnings[3],
        CombinerWarning::ConnectionSkipped { from, to, .. } if from == "(2,out)" && to == "(3,in)"
    ));

    // The crashed module stays in the container, unconnected.
    assert_eq!(kernel.root_container().module_count(), 3);
    let crasher = kernel.root_container().find_module("Crasher").unwrap();
    assert!(crasher.base().is_crashed());
    assert!(crasher.base().inputs().iter().all(|c| !c.is_connected()));

    let scale = &report.modules()[1];
    let probe = output_of(scale);
    eventually(|| probe.get_data().filter(|v| **v == 12));

    kernel.shutdown();
}

#[test]
fn test_unknown_prototypes_and_properties_are_reported() {
    let kernel = kernel();
    let report = kernel
        .load_project_str(
            "MODULE:0:Nonexistent\n\
             MODULE:1:Source\n\
             PROPERTY:(1,value)=not a number\n\
             PROPERTY:(1,missing)=1\n\
             CONNECTION:(1,nope)->(0,in)\n\
             SOMETHING ELSE\n",
        )
        .unwrap();

    assert_eq!(report.modules().len(), 1);
    let warnings = report.warnings();
    assert!(matches!(&warnings[0], CombinerWarning::LineSkipped { line: 6, .. }));
    assert!(matches!(&warnings[1], CombinerWarning::ModuleNotCreated { module, .. } if module == "#0 (Nonexistent)"));
    assert!(matches!(&warnings[2], CombinerWarning::PropertySkipped { reason, .. } if reason.contains("rejected")));
    assert!(matches!(&warnings[3], CombinerWarning::PropertySkipped { reason, .. } if reason == "no such property"));
    assert!(matches!(&warnings[4], CombinerWarning::ConnectionSkipped { .. }));
    assert_eq!(warnings.len(), 5);

    let source = &report.modules()[0];
    assert_eq!(
        source.base().properties().get_property("value").unwrap().get_as_string(),
        "1"
    );
    kernel.shutdown();
}

#[test]
fn test_save_and_reload_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.wnp");

    let original = kernel();
    let report = original
        .load_project_str(
            "MODULE:0:Source\n\
             MODULE:1:Scale\n\
             DATA:2:/data/t1.nii.gz\n\
             PROPERTY:(0,value)=5\n\
             PROPERTY:(1,settings/factor)=7\n\
             CONNECTION:(0,out)->(1,in)\n",
        )
        .unwrap();
    assert!(report.is_clean(), "{report:?}");
    original.save_project(&path).unwrap();

    let saved = ProjectFile::read(&path, ParseMode::Strict).unwrap();
    assert!(saved.records().contains(&ProjectRecord::Data {
        id: 2,
        filename: "/data/t1.nii.gz".into(),
    }));
    assert!(saved.records().contains(&ProjectRecord::Property {
        id: 1,
        path: "settings/factor".to_string(),
        value: "7".to_string(),
    }));
    assert!(saved.records().contains(&ProjectRecord::Connection {
        from_id: 0,
        from_connector: "out".to_string(),
        to_id: 1,
        to_connector: "in".to_string(),
    }));

    let reloaded = kernel();
    let report = reloaded.load_project(&path).unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(
        ProjectFile::from_container(reloaded.root_container()),
        ProjectFile::from_container(original.root_container())
    );

    let scale = reloaded.root_container().find_module("Scale").unwrap();
    let probe = output_of(&scale);
    eventually(|| probe.get_data().filter(|v| **v == 35));

    original.shutdown();
    reloaded.shutdown();
}
