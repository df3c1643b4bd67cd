//! Static Analyzer: size, banned-pattern and complexity checks over code text.

pub mod analyzer;
pub mod default_rules;
pub mod rules;
pub mod scanner;
pub mod types;

pub use analyzer::{StaticAnalyzer, MAX_FUNCTIONS, MAX_LINES};
pub use rules::{RulesConfig, SecurityRule};
pub use scanner::{format_scan_result, ScriptScanner};
pub use types::{ScanResult, SecurityIssue, SecurityIssueType, SecuritySeverity};
