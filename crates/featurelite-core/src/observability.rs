//! Observability: tracing init, audit log, security events.
//!
//! Uses config::ObservabilityConfig for FEATURELITE_QUIET, LOG_LEVEL, AUDIT_LOG, etc.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing_subscriber::{prelude::*, EnvFilter};

static AUDIT_PATH: Mutex<Option<String>> = Mutex::new(None);
static SECURITY_EVENTS_PATH: Mutex<Option<String>> = Mutex::new(None);

/// Initialize tracing. Call at process startup.
/// When FEATURELITE_QUIET=1, only WARN and above are logged.
pub fn init_tracing() {
    let cfg = crate::config::ObservabilityConfig::from_env();
    let level: String = if cfg.quiet {
        "featurelite=warn".to_string()
    } else {
        cfg.log_level.clone()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
}

/// SHA256 hex of code text; identifies artifacts in audit records.
pub fn code_hash(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

fn cached_path(slot: &Mutex<Option<String>>, configured: Option<&String>) -> Option<String> {
    {
        let guard = slot.lock().ok()?;
        if let Some(ref p) = *guard {
            return Some(p.clone());
        }
    }
    let path = configured?.clone();
    if path.is_empty() {
        return None;
    }
    if let Some(parent) = Path::new(&path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    {
        let mut guard = slot.lock().ok()?;
        *guard = Some(path.clone());
    }
    Some(path)
}

fn get_audit_path() -> Option<String> {
    let cfg = crate::config::ObservabilityConfig::from_env();
    cached_path(&AUDIT_PATH, cfg.audit_log.as_ref())
}

fn get_security_events_path() -> Option<String> {
    let cfg = crate::config::ObservabilityConfig::from_env();
    cached_path(&SECURITY_EVENTS_PATH, cfg.security_events_log.as_ref())
}

/// Append one JSON record as a line.
pub fn append_jsonl(path: &Path, record: &serde_json::Value) -> std::io::Result<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(record)?;
    writeln!(f, "{}", line)
}

// Write errors are dropped; audit never fails the operation it records.
fn audit(record: serde_json::Value) {
    if let Some(path) = get_audit_path() {
        let _ = append_jsonl(Path::new(&path), &record);
    }
}

fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Audit: candidate_rejected (any pipeline stage)
pub fn audit_candidate_rejected(plan_id: &str, stage: &str, code_hash: &str, reason: &str) {
    audit(json!({
        "ts": now_ts(),
        "event": "candidate_rejected",
        "plan_id": plan_id,
        "stage": stage,
        "code_hash": code_hash,
        "reason": reason,
    }));
}

/// Audit: candidate_accepted
pub fn audit_candidate_accepted(plan_id: &str, code_hash: &str, duration_ms: u64) {
    audit(json!({
        "ts": now_ts(),
        "event": "candidate_accepted",
        "plan_id": plan_id,
        "code_hash": code_hash,
        "duration_ms": duration_ms,
    }));
}

/// Audit: feature_registered (also emitted on hot reload)
pub fn audit_feature_registered(feature_id: &str, code_hash: &str, capabilities: &[String], reload: bool) {
    audit(json!({
        "ts": now_ts(),
        "event": "feature_registered",
        "feature_id": feature_id,
        "code_hash": code_hash,
        "capabilities": capabilities,
        "reload": reload,
    }));
}

/// Audit: feature_invoked
pub fn audit_feature_invoked(feature_id: &str, entry: &str, success: bool, duration_ms: u64) {
    audit(json!({
        "ts": now_ts(),
        "event": "feature_invoked",
        "feature_id": feature_id,
        "entry": entry,
        "success": success,
        "duration_ms": duration_ms,
    }));
}

/// Audit: feature_deactivated
pub fn audit_feature_deactivated(feature_id: &str, cause: &str) {
    audit(json!({
        "ts": now_ts(),
        "event": "feature_deactivated",
        "feature_id": feature_id,
        "cause": cause,
    }));
}

/// Audit: self_test_failed (followed by feature_deactivated)
pub fn audit_self_test_failed(feature_id: &str, kind: &str, reason: &str) {
    audit(json!({
        "ts": now_ts(),
        "event": "self_test_failed",
        "feature_id": feature_id,
        "kind": kind,
        "reason": reason,
    }));
}

/// Audit: feature_deleted
pub fn audit_feature_deleted(feature_id: &str) {
    audit(json!({
        "ts": now_ts(),
        "event": "feature_deleted",
        "feature_id": feature_id,
    }));
}

/// Security event: static analysis matched a banned pattern
pub fn security_pattern_banned(plan_id: &str, rule_id: &str, line_number: usize, snippet: &str) {
    tracing::warn!(
        plan_id = %plan_id,
        rule_id = %rule_id,
        line = line_number,
        "Security: banned pattern in candidate code"
    );
    if let Some(path) = get_security_events_path() {
        let record = json!({
            "ts": now_ts(),
            "type": "security_blocked",
            "category": "code_scan",
            "plan_id": plan_id,
            "details": {
                "rule_id": rule_id,
                "line_number": line_number,
                "code_snippet": snippet,
            }
        });
        let _ = append_jsonl(Path::new(&path), &record);
    }
}

/// Security event: sandboxed code requested a module outside the allow-list
pub fn security_module_blocked(module: &str) {
    tracing::warn!(module = %module, "Security: blocked module import in sandbox");
    if let Some(path) = get_security_events_path() {
        let record = json!({
            "ts": now_ts(),
            "type": "security_blocked",
            "category": "module",
            "details": { "module": module }
        });
        let _ = append_jsonl(Path::new(&path), &record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_hash_deterministic() {
        let h1 = code_hash("fn execute(input) { input }");
        let h2 = code_hash("fn execute(input) { input }");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, code_hash("fn get() { 1 }"));
    }

    #[test]
    fn test_append_jsonl_appends_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("audit.jsonl");
        append_jsonl(&path, &json!({"event": "a"})).unwrap();
        append_jsonl(&path, &json!({"event": "b"})).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("\"b\""));
    }
}
