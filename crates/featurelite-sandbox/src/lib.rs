//! FeatureLite Sandbox: static analysis and isolated execution of generated code.
//!
//! Two stages of the validation pipeline live here:
//! - **Static Analyzer** (`security`): size, banned-pattern and complexity checks
//!   over the code text, driven by a rule set that can be extended from YAML.
//! - **Sandbox Executor** (`runner`): runs the code in a fresh `rhai` engine on a
//!   dedicated worker thread with a wall-clock deadline, a heap-growth ceiling
//!   and an enumerated capability table (`capabilities`).

pub mod capabilities;
pub mod common;
pub mod heap;
pub mod log;
pub mod runner;
pub mod security;

pub use common::ResourceLimits;
pub use runner::{FunctionSignature, Program, SandboxError, SandboxExecutor, SandboxRun};
pub use security::{RulesConfig, StaticAnalyzer};

#[cfg(test)]
#[global_allocator]
static GLOBAL: heap::TrackingAllocator = heap::TrackingAllocator;
