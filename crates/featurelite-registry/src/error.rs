//! Typed errors of the registry and its storage.

use featurelite_core::error::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage root {path} is not accessible: {reason}")]
    RootInaccessible { path: PathBuf, reason: String },
    #[error("Invalid feature id '{0}'")]
    InvalidId(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed artifact {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Feature '{0}' not found")]
    NotFound(String),
    #[error("Feature '{0}' is inactive")]
    Inactive(String),
    #[error("Feature '{0}' has no invocable entry point")]
    NoEntryPoint(String),
    #[error("Feature '{id}' invocation failed: {message}")]
    InvocationFailed { id: String, message: String },
    #[error("Feature '{id}' could not be loaded: {message}")]
    Load { id: String, message: String },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::Inactive(_) => ErrorKind::Inactive,
            RegistryError::NoEntryPoint(_) => ErrorKind::NoEntryPoint,
            RegistryError::InvocationFailed { .. } => ErrorKind::InvocationFailed,
            RegistryError::Load { .. } => ErrorKind::SandboxRuntimeError,
            RegistryError::Storage(_) => ErrorKind::StorageError,
        }
    }
}
