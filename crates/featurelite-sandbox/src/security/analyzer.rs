//! `analyze(code)`: size → pattern → complexity, first failure reported.

use super::rules::RulesConfig;
use super::scanner::{strip_comments, ScriptScanner};
use super::types::ScanResult;
use crate::common::ResourceLimits;
use featurelite_core::error::ErrorKind;
use featurelite_core::observability;
use featurelite_core::report::{ReportMetrics, RiskLevel, Severity, StaticMetrics, ValidationReport};
use regex::Regex;
use std::sync::OnceLock;

/// Above either bound the risk is high and the candidate is rejected.
pub const MAX_LINES: usize = 500;
pub const MAX_FUNCTIONS: usize = 20;
/// Above either bound the risk is medium (informational).
pub const MEDIUM_LOOPS: usize = 10;
pub const MEDIUM_CONDITIONALS: usize = 15;

struct MetricPatterns {
    function: Regex,
    r#loop: Regex,
    conditional: Regex,
}

fn metric_patterns() -> Option<&'static MetricPatterns> {
    static PATTERNS: OnceLock<Option<MetricPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(MetricPatterns {
                function: Regex::new(r"\bfn\s+[A-Za-z_]\w*\s*\(|\bfunction\b").ok()?,
                r#loop: Regex::new(r"\b(?:for|while|loop|do)\b").ok()?,
                conditional: Regex::new(r"\b(?:if|switch)\b").ok()?,
            })
        })
        .as_ref()
}

pub struct StaticAnalyzer {
    max_source_bytes: usize,
    scanner: ScriptScanner,
}

impl StaticAnalyzer {
    pub fn new(limits: &ResourceLimits) -> Self {
        Self {
            max_source_bytes: limits.max_source_bytes,
            scanner: ScriptScanner::new(),
        }
    }

    pub fn with_rules(limits: &ResourceLimits, rules: &RulesConfig) -> Self {
        Self {
            max_source_bytes: limits.max_source_bytes,
            scanner: ScriptScanner::with_config(rules),
        }
    }

    /// Raw pattern scan, every issue included.
    pub fn scan(&self, code: &str) -> ScanResult {
        self.scanner.scan(code)
    }

    pub fn analyze(&self, code: &str) -> ValidationReport {
        self.analyze_candidate(None, code)
    }

    /// Same as `analyze`; a banned pattern is also recorded as a security
    /// event tagged with `plan_id`.
    pub fn analyze_candidate(&self, plan_id: Option<&str>, code: &str) -> ValidationReport {
        let metrics = compute_metrics(code);
        let with_metrics = |report: ValidationReport| {
            report.with_metrics(ReportMetrics::Static(metrics.clone()))
        };

        if code.len() > self.max_source_bytes {
            return with_metrics(ValidationReport::reject(
                ErrorKind::SizeExceeded,
                Severity::High,
                format!(
                    "Code size {} bytes exceeds maximum of {} bytes",
                    code.len(),
                    self.max_source_bytes
                ),
            ));
        }

        let scan = self.scanner.scan(code);
        if let Some(issue) = scan.first_blocking() {
            observability::security_pattern_banned(
                plan_id.unwrap_or("-"),
                &issue.rule_id,
                issue.line_number,
                &issue.code_snippet,
            );
            return with_metrics(ValidationReport::reject(
                ErrorKind::PatternBanned,
                issue.severity.to_report_severity(),
                format!(
                    "Banned pattern '{}' at line {} [{}]",
                    issue.description, issue.line_number, issue.rule_id
                ),
            ));
        }

        if metrics.risk == RiskLevel::High {
            return with_metrics(ValidationReport::reject(
                ErrorKind::ComplexityExceeded,
                Severity::Medium,
                format!(
                    "Complexity too high: {} lines (max {}), {} functions (max {})",
                    metrics.line_count, MAX_LINES, metrics.function_count, MAX_FUNCTIONS
                ),
            ));
        }

        let reason = format!("Static analysis passed (risk: {})", metrics.risk);
        with_metrics(ValidationReport::approve(reason))
    }
}

/// Count lines, functions, loops and conditionals. Comments count toward
/// `line_count` only.
pub fn compute_metrics(code: &str) -> StaticMetrics {
    let mut line_count = 0;
    let mut function_count = 0;
    let mut loop_count = 0;
    let mut conditional_count = 0;

    let patterns = metric_patterns();
    for line in strip_comments(code).lines() {
        line_count += 1;
        if let Some(p) = patterns {
            function_count += p.function.find_iter(line).count();
            loop_count += p.r#loop.find_iter(line).count();
            conditional_count += p.conditional.find_iter(line).count();
        }
    }

    let risk = if line_count > MAX_LINES || function_count > MAX_FUNCTIONS {
        RiskLevel::High
    } else if loop_count > MEDIUM_LOOPS || conditional_count > MEDIUM_CONDITIONALS {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    StaticMetrics {
        line_count,
        function_count,
        loop_count,
        conditional_count,
        risk,
    }
}
