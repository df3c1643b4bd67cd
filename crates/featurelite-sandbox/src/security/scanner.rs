//! Script scanner for banned syntactic shapes
//!
//! Scans candidate code line by line against the compiled rule set. Comments
//! are blanked out first, so code sharing a line with a comment is still
//! matched. This is a first filter with known false negatives, not a safety
//! proof.

use super::default_rules::get_default_rules;
use super::rules::{RulesConfig, SecurityRule};
use super::types::{ScanResult, SecurityIssue};
use regex::Regex;

pub struct ScriptScanner {
    /// Compiled rules, in evaluation order
    rules: Vec<(SecurityRule, Regex)>,
    disabled_rules: Vec<String>,
}

impl Default for ScriptScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptScanner {
    /// Create a new scanner with default rules
    pub fn new() -> Self {
        Self {
            rules: Self::compile_rules(&get_default_rules()),
            disabled_rules: Vec::new(),
        }
    }

    /// Create a scanner with custom rules configuration
    pub fn with_config(config: &RulesConfig) -> Self {
        let mut rules = if config.use_default_rules {
            get_default_rules()
        } else {
            Vec::new()
        };
        rules.extend(config.rules.clone());

        Self {
            rules: Self::compile_rules(&rules),
            disabled_rules: config.disabled_rules.clone(),
        }
    }

    fn compile_rules(rules: &[SecurityRule]) -> Vec<(SecurityRule, Regex)> {
        rules
            .iter()
            .filter(|r| r.enabled)
            .filter_map(|rule| match rule.compile() {
                Ok(regex) => Some((rule.clone(), regex)),
                Err(e) => {
                    tracing::warn!("Failed to compile rule '{}': {}", rule.id, e);
                    None
                }
            })
            .collect()
    }

    /// Disable specific rules by ID
    pub fn disable_rules(mut self, rule_ids: &[&str]) -> Self {
        self.disabled_rules
            .extend(rule_ids.iter().map(|s| s.to_string()));
        self
    }

    pub fn rule_count(&self) -> usize {
        self.rules
            .iter()
            .filter(|(r, _)| !self.disabled_rules.contains(&r.id))
            .count()
    }

    /// Scan code for banned patterns. Issues are ordered by line, then by rule order.
    pub fn scan(&self, content: &str) -> ScanResult {
        let mut issues = Vec::new();

        let stripped = strip_comments(content);
        for (line_idx, (code, line)) in stripped.lines().zip(content.lines()).enumerate() {
            if code.trim().is_empty() {
                continue;
            }
            let trimmed = line.trim();

            for (rule, regex) in &self.rules {
                if self.disabled_rules.contains(&rule.id) {
                    continue;
                }
                if regex.is_match(code) {
                    issues.push(SecurityIssue {
                        rule_id: rule.id.clone(),
                        severity: rule.severity,
                        issue_type: rule.issue_type,
                        line_number: line_idx + 1,
                        description: rule.description.clone(),
                        code_snippet: trimmed.to_string(),
                    });
                }
            }
        }

        let is_safe = issues.iter().all(|issue| !issue.severity.is_blocking());
        ScanResult { is_safe, issues }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum LexState {
    Code,
    LineComment,
    /// Nesting depth; block comments nest in the script language.
    BlockComment(usize),
    /// Inside a literal opened by the given delimiter.
    Literal(char),
}

/// Blank out `//` and `/* */` comments, keeping string literals and every
/// line break so line numbers still line up with the input.
pub fn strip_comments(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut state = LexState::Code;
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            LexState::Code => match (c, chars.peek().copied()) {
                ('/', Some('/')) => {
                    chars.next();
                    out.push_str("  ");
                    state = LexState::LineComment;
                }
                ('/', Some('*')) => {
                    chars.next();
                    out.push_str("  ");
                    state = LexState::BlockComment(1);
                }
                ('"' | '\'' | '`', _) => {
                    out.push(c);
                    state = LexState::Literal(c);
                }
                _ => out.push(c),
            },
            LexState::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = LexState::Code;
                } else {
                    out.push(' ');
                }
            }
            LexState::BlockComment(depth) => match (c, chars.peek().copied()) {
                ('*', Some('/')) => {
                    chars.next();
                    out.push_str("  ");
                    state = if depth == 1 {
                        LexState::Code
                    } else {
                        LexState::BlockComment(depth - 1)
                    };
                }
                ('/', Some('*')) => {
                    chars.next();
                    out.push_str("  ");
                    state = LexState::BlockComment(depth + 1);
                }
                ('\n', _) => out.push('\n'),
                _ => out.push(' '),
            },
            LexState::Literal(delim) => {
                out.push(c);
                if c == '\\' && delim != '`' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == delim || (c == '\n' && delim != '`') {
                    state = LexState::Code;
                }
            }
        }
    }
    out
}

/// Format scan result for display.
pub fn format_scan_result(result: &ScanResult) -> String {
    if result.issues.is_empty() {
        return "✅ No banned patterns found.".to_string();
    }

    let mut output = format!(
        "📋 Static Scan: {} item(s) flagged\n\n",
        result.issues.len()
    );
    for (idx, issue) in result.issues.iter().enumerate() {
        let severity_icon = match issue.severity {
            super::types::SecuritySeverity::Low => "🟢",
            super::types::SecuritySeverity::Medium => "🟡",
            super::types::SecuritySeverity::High => "🟠",
            super::types::SecuritySeverity::Critical => "🔴",
        };
        output.push_str(&format!(
            "  {} #{} [{:?}] {}\n",
            severity_icon,
            idx + 1,
            issue.severity,
            issue.issue_type
        ));
        output.push_str(&format!("     ├─ Rule: {}\n", issue.rule_id));
        output.push_str(&format!("     ├─ Line {}: {}\n", issue.line_number, issue.description));
        output.push_str(&format!("     └─ Code: {}\n\n", issue.code_snippet));
    }

    if result.is_safe {
        output.push_str("✅ Only informational items found.");
    } else {
        output.push_str("⛔ Blocking patterns found; the candidate will be rejected.");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::types::{SecurityIssueType, SecuritySeverity};

    #[test]
    fn test_comment_lines_are_skipped() {
        let scanner = ScriptScanner::new();
        let result = scanner.scan("// while (true) {}\n/* eval(x) */\nlet x = 1;");
        assert!(result.is_safe);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_code_after_a_comment_is_still_scanned() {
        let scanner = ScriptScanner::new();

        let result = scanner.scan("/**/ while (true) {}");
        assert!(!result.is_safe);
        assert_eq!(result.first_blocking().unwrap().rule_id, "loop-while-true");

        let result = scanner.scan("let x = 1\n* eval(\"1\");");
        assert!(!result.is_safe);
        assert_eq!(result.first_blocking().unwrap().rule_id, "eval-call");
        assert_eq!(result.first_blocking().unwrap().line_number, 2);

        let result = scanner.scan("/* a\n * while (true) {}\n */ exec(\"ls\")");
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].rule_id, "process-spawn");
        assert_eq!(result.issues[0].line_number, 3);
    }

    #[test]
    fn test_strip_comments_keeps_literals_and_lines() {
        let code = "let u = \"http://x\"; // eval(1)\n/* a /* nested */ b */ let y = 2;";
        let stripped = strip_comments(code);
        assert_eq!(stripped.lines().count(), 2);
        assert!(stripped.contains("\"http://x\""));
        assert!(!stripped.contains("eval"));
        assert!(stripped.lines().nth(1).unwrap().trim() == "let y = 2;");
        assert!(strip_comments("let s = \"a \\\" // b\"; x").contains("// b"));
    }

    #[test]
    fn test_issue_carries_line_and_rule() {
        let scanner = ScriptScanner::new();
        let result = scanner.scan("let a = 1;\nlet b = 2;\nwhile (true) {}\n");
        assert!(!result.is_safe);
        let issue = result.first_blocking().unwrap();
        assert_eq!(issue.line_number, 3);
        assert_eq!(issue.rule_id, "loop-while-true");
        assert_eq!(issue.code_snippet, "while (true) {}");
    }

    #[test]
    fn test_disabled_and_custom_rules() {
        let config = RulesConfig {
            rules: vec![SecurityRule::new(
                "custom-clock",
                r"\bnow_ms\s*\(",
                SecurityIssueType::CodeInjection,
                SecuritySeverity::Low,
                "clock read",
            )],
            disabled_rules: vec!["loop-while-true".to_string()],
            use_default_rules: true,
        };
        let scanner = ScriptScanner::with_config(&config);
        let result = scanner.scan("let stamp = now_ms();\nwhile (true) {}");
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].rule_id, "custom-clock");
        assert!(result.is_safe);

        let scanner = ScriptScanner::new().disable_rules(&["eval-call"]);
        assert_eq!(scanner.rule_count(), ScriptScanner::new().rule_count() - 1);
        assert!(scanner.scan("eval(\"1\")").is_safe);
    }

    #[test]
    fn test_format_scan_result() {
        let scanner = ScriptScanner::new();
        assert!(format_scan_result(&scanner.scan("let x = 1;")).contains("No banned patterns"));
        let text = format_scan_result(&scanner.scan("exec(\"ls\")"));
        assert!(text.contains("process-spawn"));
        assert!(text.contains("Line 1"));
    }
}
