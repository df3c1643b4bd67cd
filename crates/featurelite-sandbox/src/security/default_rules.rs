//! Default banned-pattern rules for candidate code
//!
//! Candidate code is a `rhai` script, but generators often drift into
//! JavaScript or Rust idioms, so the shapes below cover those spellings too.
//! Every default rule blocks acceptance.

use super::rules::SecurityRule;
use super::types::{SecurityIssueType, SecuritySeverity};

pub fn get_default_rules() -> Vec<SecurityRule> {
    vec![
        // ========================================================================
        // Unbounded loops / timers
        // ========================================================================
        SecurityRule::new(
            "loop-while-true",
            r"\bwhile\s*\(?\s*true\s*\)?",
            SecurityIssueType::UnboundedLoop,
            SecuritySeverity::High,
            "infinite loop pattern: while (true)",
        ),
        // Match `loop {` but not `.loop {` field access
        SecurityRule::new(
            "loop-bare",
            r"(?:^|[^\w.])loop\s*\{",
            SecurityIssueType::UnboundedLoop,
            SecuritySeverity::High,
            "infinite loop pattern: loop { }",
        ),
        SecurityRule::new(
            "loop-for-ever",
            r"\bfor\s*\(\s*;\s*;\s*\)",
            SecurityIssueType::UnboundedLoop,
            SecuritySeverity::High,
            "infinite loop pattern: for (;;)",
        ),
        SecurityRule::new(
            "timer-unbounded",
            r"\b(?:setInterval|setTimeout|setImmediate)\s*\(",
            SecurityIssueType::UnboundedLoop,
            SecuritySeverity::High,
            "unbounded timer (setInterval/setTimeout)",
        ),
        // ========================================================================
        // Dynamic code evaluation
        // ========================================================================
        SecurityRule::new(
            "eval-call",
            r"(?:^|[^\w.])eval\s*\(",
            SecurityIssueType::CodeInjection,
            SecuritySeverity::Critical,
            "dynamic code evaluation: eval()",
        ),
        SecurityRule::new(
            "eval-function-constructor",
            r"(?:^|[^\w.])(?:new\s+)?Function\s*\(",
            SecurityIssueType::CodeInjection,
            SecuritySeverity::Critical,
            "dynamic code evaluation: Function constructor",
        ),
        SecurityRule::new(
            "eval-compile",
            r"(?:^|[^\w.])(?:compile|run_script|eval_expression)\s*\(",
            SecurityIssueType::CodeInjection,
            SecuritySeverity::Critical,
            "dynamic code evaluation: runtime compilation",
        ),
        // ========================================================================
        // Subprocess spawning
        // ========================================================================
        SecurityRule::new(
            "process-spawn",
            r"(?:^|[^\w.])(?:spawn|spawnSync|exec|execSync|execFile|fork|system|popen)\s*\(",
            SecurityIssueType::ProcessExecution,
            SecuritySeverity::Critical,
            "subprocess spawning",
        ),
        SecurityRule::new(
            "process-module",
            r"child_process|std::process|\bCommand::new\b",
            SecurityIssueType::ProcessExecution,
            SecuritySeverity::Critical,
            "subprocess spawning: process module",
        ),
        // ========================================================================
        // Raw filesystem primitives
        // ========================================================================
        SecurityRule::new(
            "fs-module",
            r#"\b(?:require|import)\s*\(?\s*["'](?:node:)?(?:fs|fs/promises|path|os)["']"#,
            SecurityIssueType::FileOperation,
            SecuritySeverity::High,
            "raw filesystem primitive: fs module",
        ),
        SecurityRule::new(
            "fs-call",
            r"\b(?:readFile|readFileSync|writeFile|writeFileSync|appendFile|unlink|unlinkSync|rmdir|rmSync|open_file|read_file|write_file|remove_file)\s*\(|\b(?:std::fs|File::(?:open|create))\b",
            SecurityIssueType::FileOperation,
            SecuritySeverity::High,
            "raw filesystem primitive: file access",
        ),
        // ========================================================================
        // Raw network primitives
        // ========================================================================
        SecurityRule::new(
            "net-module",
            r#"\b(?:require|import)\s*\(?\s*["'](?:node:)?(?:https?|net|dgram|tls|dns)["']"#,
            SecurityIssueType::NetworkRequest,
            SecuritySeverity::High,
            "raw network primitive: network module",
        ),
        SecurityRule::new(
            "net-call",
            r"\b(?:fetch|http_get|http_post)\s*\(|\b(?:XMLHttpRequest|WebSocket|TcpStream|UdpSocket|socket)\b",
            SecurityIssueType::NetworkRequest,
            SecuritySeverity::High,
            "raw network primitive: socket/HTTP access",
        ),
        // ========================================================================
        // Host-global access
        // ========================================================================
        SecurityRule::new(
            "host-global-process",
            r"\bprocess\s*\.\s*(?:env|exit|kill|binding|mainModule|argv)\b",
            SecurityIssueType::HostGlobalAccess,
            SecuritySeverity::High,
            "host process object access",
        ),
        SecurityRule::new(
            "host-global-object",
            r"\b(?:globalThis|global|window)\s*(?:\.|\[)",
            SecurityIssueType::HostGlobalAccess,
            SecuritySeverity::High,
            "host global object access",
        ),
        SecurityRule::new(
            "host-global-env",
            r"\b(?:getenv|env_var)\s*\(|\bstd::env\b|\bDeno\.",
            SecurityIssueType::HostGlobalAccess,
            SecuritySeverity::High,
            "host environment access",
        ),
        SecurityRule::new(
            "host-proto-escape",
            r"__proto__|\bconstructor\s*\.\s*constructor\b",
            SecurityIssueType::HostGlobalAccess,
            SecuritySeverity::High,
            "prototype chain escape",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matching_rule(line: &str) -> Option<String> {
        get_default_rules()
            .into_iter()
            .find(|r| r.compile().unwrap().is_match(line))
            .map(|r| r.id)
    }

    #[test]
    fn test_default_rules_compile() {
        for rule in get_default_rules() {
            assert!(rule.compile().is_ok(), "rule {} failed to compile", rule.id);
        }
    }

    #[test]
    fn test_infinite_loop_shapes() {
        assert_eq!(matching_rule("while (true) {}").as_deref(), Some("loop-while-true"));
        assert_eq!(matching_rule("while true { x += 1; }").as_deref(), Some("loop-while-true"));
        assert_eq!(matching_rule("loop { }").as_deref(), Some("loop-bare"));
        assert_eq!(matching_rule("for (;;) {}").as_deref(), Some("loop-for-ever"));
        assert_eq!(matching_rule("setInterval(tick, 10)").as_deref(), Some("timer-unbounded"));
    }

    #[test]
    fn test_dangerous_primitives() {
        assert_eq!(matching_rule("let x = eval(\"1 + 1\");").as_deref(), Some("eval-call"));
        assert_eq!(matching_rule("new Function('return 1')").as_deref(), Some("eval-function-constructor"));
        assert_eq!(matching_rule("require('child_process')").as_deref(), Some("process-module"));
        assert_eq!(matching_rule("exec(\"ls\")").as_deref(), Some("process-spawn"));
        assert_eq!(matching_rule("import \"fs\" as fs;").as_deref(), Some("fs-module"));
        assert_eq!(matching_rule("fetch(\"http://x\")").as_deref(), Some("net-call"));
        assert_eq!(matching_rule("process.env.HOME").as_deref(), Some("host-global-process"));
        assert_eq!(matching_rule("globalThis.x = 1").as_deref(), Some("host-global-object"));
    }

    #[test]
    fn test_benign_lines_pass() {
        for line in [
            "fn execute(input) { #{ doubled: input.value * 2 } }",
            "while i < 10 { i += 1; }",
            "for item in items { total += item; }",
            "let evaluation = input.evaluate;",
            "import \"json\" as json;",
            "if x > 0 { print(\"ok\"); }",
        ] {
            assert_eq!(matching_rule(line), None, "false positive on: {}", line);
        }
    }
}
