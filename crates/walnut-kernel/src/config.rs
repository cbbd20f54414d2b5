//! Kernel configuration.
//!
//! The configuration is plain data, deserialized from TOML. Every field has a
//! default, so an empty document is a valid configuration:
//!
//! ```
//! use walnut_kernel::config::{KernelConfig, ParseMode};
//!
//! let config = KernelConfig::from_toml_str(r#"
//!     module_search_paths = ["/opt/walnut/modules"]
//!
//!     [threads]
//!     stack_size = 4194304
//!
//!     [project]
//!     parse_mode = "strict"
//! "#).unwrap();
//!
//! assert_eq!(config.threads.name_prefix, "walnut-module");
//! assert_eq!(config.project.parse_mode, ParseMode::Strict);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};

/// Default prototype name used for `DATA` project records.
pub const DEFAULT_DATA_MODULE: &str = "Data Module";

/// Top-level kernel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    /// Directories scanned for module libraries. When empty, every registered
    /// prototype provider is treated as statically linked.
    pub module_search_paths: Vec<PathBuf>,
    /// Module thread settings.
    pub threads: ThreadConfig,
    /// Project file settings.
    pub project: ProjectConfig,
    /// Mark the root container as crashed when one of its modules crashes.
    pub crash_if_module_crashes: bool,
}

impl KernelConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> KernelResult<Self> {
        toml::from_str(text).map_err(|e| KernelError::Config(e.to_string()))
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> KernelResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| KernelError::io(path, e))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(
            target: "walnut_kernel",
            path = %path.display(),
            "loaded kernel configuration"
        );
        Ok(config)
    }

    /// Serialize the configuration back to TOML.
    pub fn to_toml_string(&self) -> KernelResult<String> {
        toml::to_string(self).map_err(|e| KernelError::Config(e.to_string()))
    }
}

/// Settings for the threads running modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThreadConfig {
    /// Module threads are named `<prefix>:<module name>`.
    pub name_prefix: String,
    /// Stack size for module threads. Platform default if unset.
    pub stack_size: Option<usize>,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            name_prefix: "walnut-module".to_string(),
            stack_size: None,
        }
    }
}

impl ThreadConfig {
    /// The thread name for a module.
    pub fn thread_name(&self, module_name: &str) -> String {
        format!("{}:{}", self.name_prefix, module_name)
    }
}

/// How unrecognized project file lines are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// Any unrecognized line fails the whole parse.
    Strict,
    /// Unrecognized lines are skipped and reported.
    #[default]
    Lenient,
}

/// Project file settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub parse_mode: ParseMode,
    /// Prototype instantiated for `DATA` records.
    pub data_module: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            parse_mode: ParseMode::default(),
            data_module: DEFAULT_DATA_MODULE.to_string(),
        }
    }
}
