//! Error kinds shared by every stage and the registry.
//!
//! Stage failures travel as `ValidationReport`s carrying one of these kinds;
//! registry failures are typed errors that map onto the same vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    SchemaInvalid,
    PolicyViolation,
    SizeExceeded,
    PatternBanned,
    ComplexityExceeded,
    Timeout,
    MemoryExceeded,
    SandboxRuntimeError,
    NotFound,
    Inactive,
    NoEntryPoint,
    InvocationFailed,
    StorageError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SchemaInvalid => "SchemaInvalid",
            ErrorKind::PolicyViolation => "PolicyViolation",
            ErrorKind::SizeExceeded => "SizeExceeded",
            ErrorKind::PatternBanned => "PatternBanned",
            ErrorKind::ComplexityExceeded => "ComplexityExceeded",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::MemoryExceeded => "MemoryExceeded",
            ErrorKind::SandboxRuntimeError => "SandboxRuntimeError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Inactive => "Inactive",
            ErrorKind::NoEntryPoint => "NoEntryPoint",
            ErrorKind::InvocationFailed => "InvocationFailed",
            ErrorKind::StorageError => "StorageError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
