//! Security issue types and severity definitions
//!
//! This module contains the core type definitions for static scanning of
//! candidate code.

use featurelite_core::report::Severity;
use serde::{Deserialize, Serialize};

/// Security issue found in candidate code
#[derive(Debug, Clone, Serialize)]
pub struct SecurityIssue {
    /// Rule ID that triggered this issue
    pub rule_id: String,
    pub severity: SecuritySeverity,
    pub issue_type: SecurityIssueType,
    /// 1-based line number
    pub line_number: usize,
    /// Description of the issue (names the pattern)
    pub description: String,
    /// The trimmed line that triggered the issue
    pub code_snippet: String,
}

/// Severity levels for security issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecuritySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SecuritySeverity {
    /// Low-severity issues are informational and never block acceptance.
    pub fn is_blocking(&self) -> bool {
        *self >= SecuritySeverity::Medium
    }

    pub fn to_report_severity(self) -> Severity {
        match self {
            SecuritySeverity::Low => Severity::Low,
            SecuritySeverity::Medium => Severity::Medium,
            SecuritySeverity::High | SecuritySeverity::Critical => Severity::High,
        }
    }
}

/// Types of security issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityIssueType {
    ProcessExecution,
    FileOperation,
    NetworkRequest,
    CodeInjection,
    UnboundedLoop,
    HostGlobalAccess,
}

impl std::fmt::Display for SecurityIssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityIssueType::ProcessExecution => write!(f, "Process Execution"),
            SecurityIssueType::FileOperation => write!(f, "File Operation"),
            SecurityIssueType::NetworkRequest => write!(f, "Network Request"),
            SecurityIssueType::CodeInjection => write!(f, "Code Injection"),
            SecurityIssueType::UnboundedLoop => write!(f, "Unbounded Loop"),
            SecurityIssueType::HostGlobalAccess => write!(f, "Host Global Access"),
        }
    }
}

/// Result of scanning candidate code
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    /// No blocking issue was found
    pub is_safe: bool,
    pub issues: Vec<SecurityIssue>,
}

impl ScanResult {
    /// First issue that blocks acceptance, in line order.
    pub fn first_blocking(&self) -> Option<&SecurityIssue> {
        self.issues.iter().find(|i| i.severity.is_blocking())
    }
}
