//! Static analysis rule definitions and configuration
//!
//! `SecurityRule` describes one banned syntactic shape; `RulesConfig` lets a
//! deployment add rules or disable built-in ones from a YAML file.

use super::types::{SecurityIssueType, SecuritySeverity};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A single banned-pattern rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityRule {
    /// Unique identifier for the rule
    pub id: String,
    /// Regular expression matched against each non-comment line
    pub pattern: String,
    pub issue_type: SecurityIssueType,
    pub severity: SecuritySeverity,
    /// Human-readable name of the pattern, quoted in rejection reasons
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SecurityRule {
    pub fn new(
        id: &str,
        pattern: &str,
        issue_type: SecurityIssueType,
        severity: SecuritySeverity,
        description: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            pattern: pattern.to_string(),
            issue_type,
            severity,
            description: description.to_string(),
            enabled: true,
        }
    }

    /// Compile the regex pattern
    pub fn compile(&self) -> Result<Regex> {
        Regex::new(&self.pattern).with_context(|| {
            format!(
                "Failed to compile regex for rule '{}': {}",
                self.id, self.pattern
            )
        })
    }
}

/// Configuration for static analysis rules
///
/// # Example YAML Configuration
///
/// ```yaml
/// # .featurelite-rules.yaml
/// use_default_rules: true
/// disabled_rules:
///   - host-global-env
/// rules:
///   - id: custom-sleep
///     pattern: "\\bsleep\\s*\\("
///     issue_type: unbounded_loop
///     severity: medium
///     description: "sleep() call"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Custom rules to add
    #[serde(default)]
    pub rules: Vec<SecurityRule>,
    /// Rule IDs to disable from the default set
    #[serde(default)]
    pub disabled_rules: Vec<String>,
    /// Whether to use default rules (default: true)
    #[serde(default = "default_use_defaults")]
    pub use_default_rules: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            disabled_rules: Vec::new(),
            use_default_rules: true,
        }
    }
}

fn default_use_defaults() -> bool {
    true
}

/// Configuration file names recognized in a rules directory
pub const CONFIG_FILE_NAMES: &[&str] = &[
    ".featurelite-rules.yaml",
    ".featurelite-rules.yml",
    "featurelite-rules.yaml",
];

impl RulesConfig {
    /// Load rules configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules config: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse rules config: {}", path.display()))
    }

    /// Look for one of `CONFIG_FILE_NAMES` in `dir`, else use defaults.
    /// An unreadable or malformed file is logged and skipped.
    pub fn load_or_default(dir: Option<&Path>) -> Self {
        if let Some(dir) = dir {
            for name in CONFIG_FILE_NAMES {
                let config_path = dir.join(name);
                if !config_path.exists() {
                    continue;
                }
                match Self::load_from_file(&config_path) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Ignoring rules config: {:#}", e),
                }
            }
        }
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_config_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".featurelite-rules.yaml");
        fs::write(
            &path,
            r#"
disabled_rules: [host-global-env]
rules:
  - id: custom-sleep
    pattern: "\\bsleep\\s*\\("
    issue_type: unbounded_loop
    severity: medium
    description: "sleep() call"
"#,
        )
        .unwrap();

        let config = RulesConfig::load_or_default(Some(dir.path()));
        assert!(config.use_default_rules);
        assert_eq!(config.disabled_rules, vec!["host-global-env"]);
        assert_eq!(config.rules[0].id, "custom-sleep");
        assert!(config.rules[0].enabled);
        assert!(config.rules[0].compile().unwrap().is_match("sleep (10)"));
    }

    #[test]
    fn test_malformed_config_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("featurelite-rules.yaml"), "rules: [: oops").unwrap();
        let config = RulesConfig::load_or_default(Some(dir.path()));
        assert!(config.rules.is_empty());
        assert!(config.use_default_rules);
    }
}
