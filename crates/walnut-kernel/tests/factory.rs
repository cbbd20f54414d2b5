//! Prototype registration through the kernel builder and loader.

mod common;

use std::sync::Arc;

use walnut_kernel::{
    ApplyCombiner, FnProvider, Kernel, KernelConfig, KernelError, Module, ModuleLoader,
};

use common::{Scale, Source, eventually, kernel};

#[test]
fn test_duplicate_across_builtin_and_library_aborts() {
    let kernel = Kernel::builder(KernelConfig::default())
        .builtin(Arc::new(Source::new()))
        .provider(FnProvider::new("more", || {
            vec![
                Arc::new(Scale::new()) as Arc<dyn Module>,
                Arc::new(Source::new()) as Arc<dyn Module>,
            ]
        }))
        .build();

    let err = kernel.start().unwrap_err();
    assert!(matches!(err, KernelError::PrototypeNotUnique { ref name } if name == "Source"));
    assert_eq!(kernel.factory().prototype_count(), 0);
    assert!(kernel.factory().is_prototype_available("Scale").is_none());
}

#[test]
fn test_search_paths_select_libraries() {
    let dir = tempfile::tempdir().unwrap();
    let library = &ModuleLoader::library_file_names("scaling")[0];
    std::fs::write(dir.path().join(library), b"").unwrap();

    let config = KernelConfig {
        module_search_paths: vec![dir.path().to_path_buf()],
        ..KernelConfig::default()
    };
    let kernel = Kernel::builder(config)
        .provider(FnProvider::new("scaling", || {
            vec![Arc::new(Scale::new()) as Arc<dyn Module>]
        }))
        .provider(FnProvider::new("sources", || {
            vec![Arc::new(Source::new()) as Arc<dyn Module>]
        }))
        .build();
    kernel.start().unwrap();

    let scale = kernel.factory().get_prototype_by_name("Scale").unwrap();
    assert_eq!(scale.base().local_path(), dir.path());
    assert!(kernel.factory().is_prototype_available("Source").is_none());
    assert!(kernel.factory().is_prototype_available("Data Module").is_some());
}

#[test]
fn test_compatible_prototypes_build_a_chain() {
    let kernel = kernel();

    let starters = kernel.factory().get_compatible_prototypes(None);
    let names: Vec<_> = starters.iter().map(|g| g.prototype().name()).collect();
    assert_eq!(names, ["Data Module", "Source"]);

    let source = kernel.apply_module("Source").unwrap();
    source.base().wait_ready_or_crashed();

    let groups = kernel.factory().get_compatible_prototypes(Some(&source));
    let followers: Vec<_> = groups
        .iter()
        .filter(|g| g.combiners()[0].source().is_some())
        .map(|g| g.prototype().name())
        .collect();
    assert_eq!(followers, ["Crasher", "Scale"]);
    assert_eq!(
        groups.iter().map(|g| g.prototype().name()).collect::<Vec<_>>(),
        kernel
            .factory()
            .get_compatible_prototypes(Some(&source))
            .iter()
            .map(|g| g.prototype().name())
            .collect::<Vec<_>>()
    );

    let scale_group = groups
        .iter()
        .find(|g| g.prototype().name() == "Scale")
        .unwrap();
    let combiner: &ApplyCombiner = &scale_group.combiners()[0];
    let report = kernel.apply(combiner).unwrap();
    assert!(report.is_clean(), "{report:?}");

    let scale = &report.modules()[0];
    let output = scale.base().get_output_connector("out").unwrap();
    eventually(|| {
        output
            .data()
            .and_then(|data| data.downcast::<i32>().ok())
            .filter(|v| **v == 2)
    });
    kernel.shutdown();
}
