//! Validation report produced once per stage (plan, static, dynamic).

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// Report severity. `None` on approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

/// Complexity heuristic outcome of static analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticMetrics {
    pub line_count: usize,
    pub function_count: usize,
    pub loop_count: usize,
    pub conditional_count: usize,
    pub risk: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxMetrics {
    /// Wall-clock time of the run in milliseconds
    pub execution_time: u64,
    /// Peak heap growth of the isolated context during the run, in bytes
    pub memory_delta: u64,
    pub return_value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportMetrics {
    Static(StaticMetrics),
    Sandbox(SandboxMetrics),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub approved: bool,
    pub reason: String,
    pub severity: Severity,
    /// Set on rejection only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ReportMetrics>,
}

impl ValidationReport {
    pub fn approve(reason: impl Into<String>) -> Self {
        Self {
            approved: true,
            reason: reason.into(),
            severity: Severity::None,
            kind: None,
            metrics: None,
        }
    }

    pub fn reject(kind: ErrorKind, severity: Severity, reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
            severity,
            kind: Some(kind),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ReportMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn static_metrics(&self) -> Option<&StaticMetrics> {
        match &self.metrics {
            Some(ReportMetrics::Static(m)) => Some(m),
            _ => None,
        }
    }

    pub fn sandbox_metrics(&self) -> Option<&SandboxMetrics> {
        match &self.metrics {
            Some(ReportMetrics::Sandbox(m)) => Some(m),
            _ => None,
        }
    }
}
