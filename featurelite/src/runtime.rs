//! Process wiring: config is read once here and frozen into the values the
//! library constructors take.

use anyhow::{Context, Result};
use featurelite_core::config::{LimitsConfig, PathsConfig, PolicyConfig};
use featurelite_core::plan::{PlanPolicy, PlanValidator};
use featurelite_registry::{FeatureRegistry, FeatureStore, QuarantineStore, ValidationPipeline};
use featurelite_sandbox::{ResourceLimits, RulesConfig, SandboxExecutor, StaticAnalyzer};
use std::sync::Arc;

/// Frozen startup configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub limits: ResourceLimits,
    pub policy: PolicyConfig,
    pub paths: PathsConfig,
}

impl Settings {
    pub fn load(timeout_ms: Option<u64>, max_source_bytes: Option<u64>) -> Self {
        let limits_cfg = LimitsConfig::from_env().with_cli_overrides(timeout_ms, max_source_bytes);
        let policy = PolicyConfig::from_env(&limits_cfg);
        Self {
            limits: ResourceLimits::from_config(&limits_cfg),
            policy,
            paths: PathsConfig::from_env(),
        }
    }

    pub fn plan_validator(&self) -> PlanValidator {
        PlanValidator::new(PlanPolicy::new(
            self.paths.writable_root.clone(),
            &self.policy.allowed_dependencies,
        ))
    }

    /// Static analyzer with the configured rules file, if any. A rules file
    /// that was named explicitly must load.
    pub fn analyzer(&self) -> Result<StaticAnalyzer> {
        let rules = match &self.policy.rules_file {
            Some(path) => RulesConfig::load_from_file(path)?,
            None => RulesConfig::default(),
        };
        Ok(StaticAnalyzer::with_rules(&self.limits, &rules))
    }

    pub fn executor(&self) -> SandboxExecutor {
        SandboxExecutor::new(self.limits.clone())
    }

    /// Defaults rooted in a scratch directory.
    #[cfg(test)]
    pub(crate) fn rooted_at(root: &std::path::Path) -> Self {
        let limits_cfg = LimitsConfig::default().with_cli_overrides(Some(2_000), None);
        Self {
            limits: ResourceLimits::from_config(&limits_cfg),
            policy: PolicyConfig {
                allowed_dependencies: limits_cfg.allowed_modules.clone(),
                rules_file: None,
            },
            paths: PathsConfig {
                storage_root: root.join("features"),
                quarantine_dir: root.join("quarantine"),
                writable_root: root.join("features"),
            },
        }
    }
}

/// Pipeline and registry over the configured storage.
pub struct Runtime {
    pub pipeline: ValidationPipeline,
    pub registry: FeatureRegistry,
}

impl Runtime {
    /// Open storage and load every persisted feature. An inaccessible
    /// storage root is fatal.
    pub fn open(settings: &Settings) -> Result<Self> {
        let executor = Arc::new(settings.executor());
        let store = FeatureStore::open(&settings.paths.storage_root)
            .context("Cannot start without a usable storage root")?;
        let quarantine = QuarantineStore::open(&settings.paths.quarantine_dir)
            .context("Cannot open quarantine directory")?;

        let pipeline = ValidationPipeline::new(
            settings.plan_validator(),
            settings.analyzer()?,
            Arc::clone(&executor),
            quarantine,
        );
        let registry = FeatureRegistry::new(store, executor);
        let loaded = registry.load_all()?;
        tracing::debug!(count = loaded.len(), "Registry ready");

        Ok(Self { pipeline, registry })
    }
}
