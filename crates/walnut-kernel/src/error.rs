//! Error types for the module kernel.

use std::path::PathBuf;

use walnut_core::PropertyError;

/// Result type alias for kernel operations.
pub type KernelResult<T> = std::result::Result<T, KernelError>;

/// Errors raised by the factory, container, connectors and project files.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Two prototypes share a name. The load that detected it was aborted.
    #[error("Prototype name '{name}' is not unique")]
    PrototypeNotUnique { name: String },

    /// The requested prototype is not registered, or the given module is not a prototype.
    #[error("Unknown prototype '{name}'")]
    PrototypeUnknown { name: String },

    /// A module was used before `initialize`.
    #[error("Module '{name}' has not been initialized")]
    ModuleNotInitialized { name: String },

    /// `initialize` was called twice.
    #[error("Module '{name}' is already initialized")]
    AlreadyInitialized { name: String },

    /// The module already belongs to a container.
    #[error("Module '{name}' already belongs to a container")]
    AlreadyAssociated { name: String },

    /// The module does not belong to this container.
    #[error("Module '{name}' does not belong to container '{container}'")]
    NotAssociated { name: String, container: String },

    /// No connector with this name exists on the module.
    #[error("Module '{module}' has no connector named '{connector}'")]
    ConnectorNotFound { module: String, connector: String },

    /// A connector name was declared twice on one module.
    #[error("Module '{module}' already has a connector named '{connector}'")]
    ConnectorNameCollision { module: String, connector: String },

    /// The two connectors cannot be connected (direction or data type).
    #[error("Cannot connect '{from}' to '{to}': {reason}")]
    ConnectorsIncompatible {
        from: String,
        to: String,
        reason: String,
    },

    /// The connector already carries as many connections as it allows.
    #[error("Connector '{connector}' allows at most {capacity} connection(s)")]
    ConnectorCapacityExceeded { connector: String, capacity: usize },

    /// Property lookup or registration failed.
    #[error("Property error: {0}")]
    Property(#[from] PropertyError),

    /// File I/O error.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A project file line was not recognized.
    #[error("Unrecognized project file line {line}: '{content}'")]
    Parse { line: usize, content: String },

    /// Invalid kernel configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The operating system refused to start a module thread.
    #[error("Failed to spawn thread for module '{name}': {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl KernelError {
    /// Create an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a connector lookup error.
    pub fn connector_not_found(module: impl Into<String>, connector: impl Into<String>) -> Self {
        Self::ConnectorNotFound {
            module: module.into(),
            connector: connector.into(),
        }
    }

    /// Create an incompatibility error.
    pub fn incompatible(
        from: impl Into<String>,
        to: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ConnectorsIncompatible {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }

    /// Create an unknown prototype error.
    pub fn unknown_prototype(name: impl Into<String>) -> Self {
        Self::PrototypeUnknown { name: name.into() }
    }
}

/// Errors returned from a module's thread body.
///
/// Any error (or a panic) marks the module as crashed.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// The module gave up with a message.
    #[error("{0}")]
    Failed(String),

    /// A kernel operation failed inside the module.
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// A property operation failed inside the module.
    #[error(transparent)]
    Property(#[from] PropertyError),
}

impl ModuleError {
    /// Create a failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
