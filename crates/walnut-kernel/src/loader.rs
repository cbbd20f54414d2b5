//! Discovery of module prototypes.
//!
//! Module collections register themselves as [`PrototypeProvider`]s. The
//! [`ModuleLoader`] decides which providers are active: without search paths
//! every provider is (statically linked and) active; with search paths, a
//! provider is active only if a library file carrying its name is found in
//! one of them, e.g. `libwalnut_filters.so` on Linux or `walnut_filters.dll`
//! on Windows for a provider named `walnut_filters`.

use std::collections::HashSet;
use std::env::consts::{DLL_EXTENSION, DLL_PREFIX};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{KernelError, KernelResult};
use crate::module::Module;

/// A named collection of module prototypes.
pub trait PrototypeProvider: Send + Sync {
    /// The library name, without platform prefix or extension.
    fn name(&self) -> &str;

    /// Fresh, uninitialized prototypes.
    fn prototypes(&self) -> Vec<Arc<dyn Module>>;
}

/// A provider built from a closure.
pub struct FnProvider<F> {
    name: String,
    create: F,
}

impl<F> FnProvider<F>
where
    F: Fn() -> Vec<Arc<dyn Module>> + Send + Sync,
{
    pub fn new(name: impl Into<String>, create: F) -> Self {
        Self {
            name: name.into(),
            create,
        }
    }
}

impl<F> PrototypeProvider for FnProvider<F>
where
    F: Fn() -> Vec<Arc<dyn Module>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn prototypes(&self) -> Vec<Arc<dyn Module>> {
        (self.create)()
    }
}

/// Scans search paths for module libraries and collects the prototypes of
/// the matching providers.
#[derive(Default)]
pub struct ModuleLoader {
    search_paths: Vec<PathBuf>,
    providers: Vec<Arc<dyn PrototypeProvider>>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory to scan.
    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Add several directories to scan.
    pub fn search_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.search_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Register a provider.
    pub fn provider(mut self, provider: impl PrototypeProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn providers(&self) -> &[Arc<dyn PrototypeProvider>] {
        &self.providers
    }

    /// File names under which a provider's library is recognized.
    pub fn library_file_names(name: &str) -> Vec<String> {
        let mut names = vec![format!("{DLL_PREFIX}{name}.{DLL_EXTENSION}")];
        if !DLL_PREFIX.is_empty() {
            names.push(format!("{name}.{DLL_EXTENSION}"));
        }
        names
    }

    /// Collect the prototypes of all active providers.
    ///
    /// Each prototype's local path is set to the directory its library was
    /// found in. A search path that cannot be read fails the whole load.
    pub fn load(&self) -> KernelResult<Vec<Arc<dyn Module>>> {
        let mut prototypes = Vec::new();

        if self.search_paths.is_empty() {
            for provider in &self.providers {
                prototypes.extend(provider.prototypes());
            }
            tracing::debug!(
                target: "walnut_kernel::factory",
                providers = self.providers.len(),
                "collected statically linked prototypes"
            );
            return Ok(prototypes);
        }

        let mut activated = HashSet::new();
        for dir in &self.search_paths {
            let files = library_files(dir)?;
            for provider in &self.providers {
                if activated.contains(provider.name()) {
                    continue;
                }
                let found = Self::library_file_names(provider.name())
                    .iter()
                    .any(|candidate| files.contains(candidate));
                if !found {
                    continue;
                }

                tracing::debug!(
                    target: "walnut_kernel::factory",
                    library = provider.name(),
                    path = %dir.display(),
                    "loading module library"
                );
                activated.insert(provider.name().to_string());
                for prototype in provider.prototypes() {
                    prototype.base().set_local_path(dir);
                    prototypes.push(prototype);
                }
            }
        }

        for provider in &self.providers {
            if !activated.contains(provider.name()) {
                tracing::debug!(
                    target: "walnut_kernel::factory",
                    library = provider.name(),
                    "no library found in search paths"
                );
            }
        }
        Ok(prototypes)
    }
}

fn library_files(dir: &Path) -> KernelResult<HashSet<String>> {
    let entries = std::fs::read_dir(dir).map_err(|e| KernelError::io(dir, e))?;
    let mut files = HashSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| KernelError::io(dir, e))?;
        if let Some(name) = entry.file_name().to_str() {
            files.insert(name.to_string());
        }
    }
    Ok(files)
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("search_paths", &self.search_paths)
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::tests::{Crasher, Doubler};

    fn loader() -> ModuleLoader {
        ModuleLoader::new()
            .provider(FnProvider::new("arith", || {
                vec![Arc::new(Doubler::new()) as Arc<dyn Module>]
            }))
            .provider(FnProvider::new("broken", || {
                vec![Arc::new(Crasher::new(false)) as Arc<dyn Module>]
            }))
    }

    #[test]
    fn test_static_providers_all_active() {
        let prototypes = loader().load().unwrap();
        let names: Vec<_> = prototypes.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, ["Doubler", "Crasher"]);
    }

    #[test]
    fn test_search_path_activates_matching_library() {
        let dir = tempfile::tempdir().unwrap();
        let library = &ModuleLoader::library_file_names("arith")[0];
        std::fs::write(dir.path().join(library), b"").unwrap();
        std::fs::write(dir.path().join("README.txt"), b"").unwrap();

        let prototypes = loader().search_path(dir.path()).load().unwrap();
        assert_eq!(prototypes.len(), 1);
        assert_eq!(prototypes[0].name(), "Doubler");
        assert_eq!(prototypes[0].base().local_path(), dir.path());
    }

    #[test]
    fn test_provider_loaded_once_across_paths() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        for dir in [&first, &second] {
            let library = &ModuleLoader::library_file_names("arith")[0];
            std::fs::write(dir.path().join(library), b"").unwrap();
        }

        let prototypes = loader()
            .search_paths([first.path(), second.path()])
            .load()
            .unwrap();
        assert_eq!(prototypes.len(), 1);
        assert_eq!(prototypes[0].base().local_path(), first.path());
    }

    #[test]
    fn test_missing_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let result = loader().search_path(dir.path().join("missing")).load();
        assert!(matches!(result, Err(KernelError::Io { .. })));
    }
}
