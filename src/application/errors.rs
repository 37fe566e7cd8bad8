//! Application layer errors

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level host errors, surfaced by the binary
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Custom-id encode/decode errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Invalid {field} segment {value:?}: empty or contains a reserved delimiter")]
    InvalidSegment { field: &'static str, value: String },

    #[error("Encoded identifier is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("Malformed identifier: {0}")]
    Malformed(String),
}

/// Command registry and installer errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid command definition: {0}")]
    InvalidDefinition(String),

    #[error("Module '{module}' generation {generation} is no longer live")]
    StaleGeneration { module: String, generation: u64 },

    #[error("Identifier error: {0}")]
    Identifier(#[from] IdentifierError),

    #[error("Install failed: {0}")]
    Install(#[from] PlatformError),
}

/// Errors returned by the external chat platform
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Rejected by platform: {0}")]
    Rejected(String),

    #[error("Interaction already acknowledged")]
    AlreadyAcknowledged,
}

/// Errors a handler may return; contained by the middleware chain and router
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Session expired")]
    SessionExpired,

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Handler failed: {0}")]
    Failed(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Module loading and lifecycle errors
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("No entry file found in {}", .0.display())]
    MissingEntry(PathBuf),

    #[error("Invalid manifest {}: {reason}", path.display())]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("Unknown catalog entry '{0}'")]
    UnknownEntry(String),

    #[error("Invalid export: {0}")]
    InvalidExport(String),

    #[error("Failed to load library: {0}")]
    Library(String),

    #[error("Init failed: {0}")]
    Init(String),

    #[error("Module '{0}' is already loaded")]
    AlreadyLoaded(String),

    #[error("Module '{0}' not found")]
    NotFound(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single disposer failure
#[derive(Error, Debug)]
#[error("Disposer '{label}' failed: {reason}")]
pub struct DisposeError {
    pub label: String,
    pub reason: String,
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl HandlerError {
    /// Wrap any error type as a handler failure
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        HandlerError::Other(Box::new(err))
    }
}

/// Result type for handlers
pub type HandlerResult = Result<(), HandlerError>;

/// Result type for module operations
pub type ModuleResult<T> = Result<T, ModuleError>;
