//! Plan Validator: schema + policy checks on declared intent.
//!
//! Checks run in a fixed order and the first failure is reported:
//! schema → content policy → path policy → dependency policy.
//! The content policy is a denylist heuristic over the serialized plan; it
//! catches honest declarations of bad intent, not disguised ones.

use super::{is_valid_id, Plan, MAX_ID_LEN};
use crate::error::ErrorKind;
use crate::path_validation::resolve_under_root;
use crate::report::{Severity, ValidationReport};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::PathBuf;

pub const TITLE_MIN_CHARS: usize = 3;
pub const TITLE_MAX_CHARS: usize = 100;
pub const MAX_DEPENDENCIES: usize = 10;
pub const MAX_DECLARED_FILES: usize = 5;

/// High-risk terms: destructive actions, credential handling, exploit vocabulary.
pub const DEFAULT_DENIED_TERMS: &[&str] = &[
    // destructive
    "rm -rf",
    "delete all",
    "drop table",
    "format disk",
    "wipe",
    "destroy",
    // credentials / secrets
    "password",
    "passwords",
    "credential",
    "credentials",
    "secret",
    "secrets",
    "private key",
    "api key",
    "api_key",
    "access token",
    // exploits
    "hack",
    "hacking",
    "hacker",
    "exploit",
    "malware",
    "virus",
    "ransomware",
    "keylogger",
    "backdoor",
    "rootkit",
    "phishing",
    "ddos",
    "botnet",
    "privilege escalation",
    "bypass",
];

/// Policy inputs for plan validation.
#[derive(Debug, Clone)]
pub struct PlanPolicy {
    /// Single directory every declared file must resolve inside
    pub writable_root: PathBuf,
    pub allowed_dependencies: BTreeSet<String>,
    pub denied_terms: Vec<String>,
}

impl PlanPolicy {
    pub fn new(writable_root: impl Into<PathBuf>, allowed_dependencies: &[String]) -> Self {
        Self {
            writable_root: writable_root.into(),
            allowed_dependencies: allowed_dependencies.iter().cloned().collect(),
            denied_terms: DEFAULT_DENIED_TERMS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub struct PlanValidator {
    policy: PlanPolicy,
    /// (term, word-boundary matcher)
    denylist: Vec<(String, Regex)>,
}

impl PlanValidator {
    pub fn new(policy: PlanPolicy) -> Self {
        let denylist = policy
            .denied_terms
            .iter()
            .filter_map(|term| {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(term));
                match Regex::new(&pattern) {
                    Ok(re) => Some((term.to_lowercase(), re)),
                    Err(e) => {
                        tracing::warn!("Failed to compile denylist term '{}': {}", term, e);
                        None
                    }
                }
            })
            .collect();
        Self { policy, denylist }
    }

    /// Validate a plan. Reports the first failing check.
    pub fn validate(&self, plan: &Plan) -> ValidationReport {
        let report = self
            .check_schema(plan)
            .or_else(|| self.check_content(plan))
            .or_else(|| self.check_paths(plan))
            .or_else(|| self.check_dependencies(plan))
            .unwrap_or_else(|| ValidationReport::approve("Plan passed schema and policy checks"));

        if report.approved {
            tracing::debug!(plan_id = %plan.id, "Plan approved");
        } else {
            tracing::info!(plan_id = %plan.id, reason = %report.reason, "Plan rejected");
        }
        report
    }

    fn check_schema(&self, plan: &Plan) -> Option<ValidationReport> {
        let schema = |reason: String| {
            Some(ValidationReport::reject(
                ErrorKind::SchemaInvalid,
                Severity::High,
                reason,
            ))
        };

        if plan.id.trim().is_empty() {
            return schema("Missing required field 'id'".to_string());
        }
        if !is_valid_id(&plan.id) {
            return schema(format!(
                "Field 'id' must be 1-{} ASCII letters, digits, '-' or '_'",
                MAX_ID_LEN
            ));
        }
        if plan.title.trim().is_empty() {
            return schema("Missing required field 'title'".to_string());
        }
        if plan.description.trim().is_empty() {
            return schema("Missing required field 'description'".to_string());
        }
        if plan.category.is_none() {
            return schema("Missing required field 'category'".to_string());
        }
        if plan.complexity.is_none() {
            return schema("Missing required field 'complexity'".to_string());
        }

        let title_len = plan.title.trim().chars().count();
        if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&title_len) {
            return schema(format!(
                "Field 'title' length {} is outside {}..={}",
                title_len, TITLE_MIN_CHARS, TITLE_MAX_CHARS
            ));
        }
        if plan.declared_dependencies.len() > MAX_DEPENDENCIES {
            return schema(format!(
                "Field 'declaredDependencies' has {} entries (max {})",
                plan.declared_dependencies.len(),
                MAX_DEPENDENCIES
            ));
        }
        if plan.declared_files.len() > MAX_DECLARED_FILES {
            return schema(format!(
                "Field 'declaredFiles' has {} entries (max {})",
                plan.declared_files.len(),
                MAX_DECLARED_FILES
            ));
        }
        if let Some(idx) = plan.declared_files.iter().position(|f| f.path.trim().is_empty()) {
            return schema(format!("Field 'declaredFiles[{}].path' is empty", idx));
        }
        None
    }

    fn check_content(&self, plan: &Plan) -> Option<ValidationReport> {
        let serialized = match serde_json::to_string(plan) {
            Ok(s) => s,
            Err(e) => {
                return Some(ValidationReport::reject(
                    ErrorKind::SchemaInvalid,
                    Severity::High,
                    format!("Plan could not be serialized: {}", e),
                ))
            }
        };
        self.denylist
            .iter()
            .find(|(_, re)| re.is_match(&serialized))
            .map(|(term, _)| {
                ValidationReport::reject(
                    ErrorKind::PolicyViolation,
                    Severity::High,
                    format!("Plan contains prohibited term: '{}'", term),
                )
            })
    }

    fn check_paths(&self, plan: &Plan) -> Option<ValidationReport> {
        for file in &plan.declared_files {
            if let Err(e) = resolve_under_root(&self.policy.writable_root, &file.path) {
                return Some(ValidationReport::reject(
                    ErrorKind::PolicyViolation,
                    Severity::High,
                    format!("Declared file '{}' rejected: {}", file.path, e),
                ));
            }
        }
        None
    }

    fn check_dependencies(&self, plan: &Plan) -> Option<ValidationReport> {
        plan.declared_dependencies
            .iter()
            .find(|dep| !self.policy.allowed_dependencies.contains(dep.as_str()))
            .map(|dep| {
                ValidationReport::reject(
                    ErrorKind::PolicyViolation,
                    Severity::Medium,
                    format!("Dependency '{}' is not in the allow-list", dep),
                )
            })
    }
}
