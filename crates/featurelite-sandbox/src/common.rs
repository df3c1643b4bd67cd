//! Resource ceilings shared by the static analyzer and the sandbox executor.
//!
//! `ResourceLimits` is built once at startup from `LimitsConfig` and handed to
//! constructors as an immutable value; nothing in this crate reads the
//! environment on its own.

use featurelite_core::config::LimitsConfig;
use std::collections::BTreeSet;
use std::time::Duration;

// ============================================================
// Sandbox Constants
// ============================================================

/// Maximum number of lines kept by the sandbox logging sink
pub const LOG_MAX_LINES: usize = 200;

/// Maximum characters kept per logged line
pub const LOG_MAX_LINE_CHARS: usize = 1000;

/// Interpreter call-stack depth
pub const MAX_CALL_LEVELS: usize = 64;

/// Interpreter expression nesting (global, inside functions)
pub const MAX_EXPR_DEPTH: usize = 64;
pub const MAX_FUNCTION_EXPR_DEPTH: usize = 32;

/// Upper bound on array / object-map sizes inside the interpreter
pub const MAX_COLLECTION_ITEMS: usize = 1_000_000;

/// Maximum `import` statements evaluated per run
pub const MAX_MODULES: usize = 16;

/// Extra time the caller waits past the deadline before forcing the abort flag
pub const DEADLINE_GRACE_MS: u64 = 250;

/// Immutable, process-wide execution ceilings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_source_bytes: usize,
    pub max_execution_duration: Duration,
    /// Maximum heap growth of one isolated run, in bytes
    pub max_heap_delta: u64,
    pub allowed_module_names: BTreeSet<String>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::from_config(&LimitsConfig::default())
    }
}

impl ResourceLimits {
    pub fn from_config(config: &LimitsConfig) -> Self {
        Self {
            max_source_bytes: usize::try_from(config.max_source_bytes).unwrap_or(usize::MAX),
            max_execution_duration: Duration::from_millis(config.max_execution_ms),
            max_heap_delta: config.max_heap_delta_bytes,
            allowed_module_names: config.allowed_modules.iter().cloned().collect(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.max_execution_duration = timeout;
        self
    }

    pub fn with_max_heap_delta(mut self, bytes: u64) -> Self {
        self.max_heap_delta = bytes;
        self
    }

    pub fn with_allowed_modules(mut self, names: &[&str]) -> Self {
        self.allowed_module_names = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.max_execution_duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// String ceiling for the interpreter. A string cannot outgrow the heap budget.
    pub fn max_string_bytes(&self) -> usize {
        usize::try_from(self.max_heap_delta).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_from_default_config() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.max_source_bytes, 50_000);
        assert_eq!(limits.max_execution_duration, Duration::from_millis(5_000));
        assert_eq!(limits.max_heap_delta, 64 * 1024 * 1024);
        assert!(limits.allowed_module_names.contains("json"));
        assert!(limits.allowed_module_names.contains("text"));
    }

    #[test]
    fn test_limits_builders() {
        let limits = ResourceLimits::default()
            .with_timeout(Duration::from_millis(150))
            .with_allowed_modules(&["math"]);
        assert_eq!(limits.timeout_ms(), 150);
        assert_eq!(limits.allowed_module_names.len(), 1);
    }
}
