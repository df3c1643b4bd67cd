//! End-to-end tests: pipeline → registry → storage.

use crate::artifact::FeatureMetadata;
use crate::{
    Accepted, CandidateState, Capability, FeatureRegistry, FeatureStore, Outcome, QuarantineRecord,
    QuarantineStore, RegistryError, Stage, ValidationPipeline,
};
use chrono::Utc;
use featurelite_core::error::ErrorKind;
use featurelite_core::plan::{Category, Complexity, Plan, PlanPolicy, PlanValidator};
use featurelite_sandbox::{ResourceLimits, SandboxExecutor, StaticAnalyzer};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DOUBLER: &str = "fn execute(input) { #{ doubled: input.value * 2 } }";

struct Harness {
    tmp: TempDir,
    executor: Arc<SandboxExecutor>,
    pipeline: ValidationPipeline,
    registry: FeatureRegistry,
}

impl Harness {
    fn new() -> Self {
        Self::with_limits(ResourceLimits::default().with_timeout(Duration::from_secs(2)))
    }

    fn with_limits(limits: ResourceLimits) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let executor = Arc::new(SandboxExecutor::new(limits.clone()));
        let allowed: Vec<String> = limits.allowed_module_names.iter().cloned().collect();
        let pipeline = ValidationPipeline::new(
            PlanValidator::new(PlanPolicy::new(tmp.path().join("features"), &allowed)),
            StaticAnalyzer::new(&limits),
            Arc::clone(&executor),
            QuarantineStore::open(&tmp.path().join("quarantine")).unwrap(),
        );
        let registry = Self::open_registry(&tmp, &executor);
        Self {
            tmp,
            executor,
            pipeline,
            registry,
        }
    }

    fn open_registry(tmp: &TempDir, executor: &Arc<SandboxExecutor>) -> FeatureRegistry {
        let store = FeatureStore::open(&tmp.path().join("features")).unwrap();
        FeatureRegistry::new(store, Arc::clone(executor))
    }

    fn features_dir(&self) -> PathBuf {
        self.registry.store().root().to_path_buf()
    }

    fn quarantine(&self) -> Vec<QuarantineRecord> {
        let path = self.tmp.path().join("quarantine").join("quarantine.jsonl");
        fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn accept(&self, plan: &Plan, code: &str) -> Accepted {
        match self.pipeline.evaluate(plan, code) {
            Outcome::Accepted(accepted) => accepted,
            Outcome::Rejected(r) => panic!("candidate rejected at {}: {}", r.stage, r.reason()),
        }
    }

    fn register(&self, id: &str, code: &str) -> crate::Feature {
        let accepted = self.accept(&plan(id), code);
        self.registry.register(accepted).unwrap()
    }
}

fn plan(id: &str) -> Plan {
    Plan::new("Number doubler", "Doubles a number", Category::Utility, Complexity::Low).with_id(id)
}

// ─── Pipeline ───────────────────────────────────────────────────────────────

#[test]
fn test_hack_plan_rejected_and_quarantined() {
    let h = Harness::new();
    let plan = Plan::new("Hack the system", "...", Category::Utility, Complexity::Low);
    let outcome = h.pipeline.evaluate(&plan, DOUBLER);

    let Outcome::Rejected(rejection) = outcome else {
        panic!("plan should be rejected");
    };
    assert_eq!(rejection.stage, Stage::Plan);
    assert_eq!(rejection.kind(), Some(ErrorKind::PolicyViolation));
    assert!(rejection.reason().contains("hack"));
    assert_eq!(rejection.history(), &[CandidateState::Proposed, CandidateState::Rejected]);

    let records = h.quarantine();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stage, "plan");
    assert!(records[0].artifact_text.contains("Hack the system"));
}

#[test]
fn test_infinite_loop_rejected_at_static_stage() {
    let h = Harness::new();
    let outcome = h.pipeline.evaluate(&plan("looper"), "while (true) {}");

    let Outcome::Rejected(rejection) = outcome else {
        panic!("code should be rejected");
    };
    assert_eq!(rejection.stage, Stage::Static);
    assert_eq!(rejection.kind(), Some(ErrorKind::PatternBanned));
    assert!(rejection.reason().contains("infinite loop"));
    assert_eq!(
        rejection.history(),
        &[CandidateState::Proposed, CandidateState::PlanChecked, CandidateState::Rejected]
    );

    let records = h.quarantine();
    assert_eq!(records[0].artifact_text, "while (true) {}");
    assert_eq!(records[0].reason, rejection.reason());
    assert_eq!(records[0].plan_id, "looper");
}

#[test]
fn test_sandbox_timeout_rejects_and_tears_down() {
    let h = Harness::with_limits(ResourceLimits::default().with_timeout(Duration::from_millis(200)));
    for _ in 0..3 {
        let outcome = h.pipeline.evaluate(&plan("spinner"), "let x = 0; while x >= 0 { x += 1; }");
        let Outcome::Rejected(rejection) = outcome else {
            panic!("code should time out");
        };
        assert_eq!(rejection.stage, Stage::Sandbox);
        assert_eq!(rejection.kind(), Some(ErrorKind::Timeout));
        assert_eq!(h.executor.live_contexts(), 0);
    }
    assert_eq!(h.quarantine().len(), 3);
}

#[test]
fn test_accepted_candidate_passed_every_stage() {
    let h = Harness::new();
    let accepted = h.accept(&plan("doubler"), DOUBLER);
    assert_eq!(
        accepted.history(),
        &[
            CandidateState::Proposed,
            CandidateState::PlanChecked,
            CandidateState::StaticChecked,
            CandidateState::SandboxChecked,
            CandidateState::Accepted,
        ]
    );
    let stages: Vec<Stage> = accepted.reports().iter().map(|(s, _)| *s).collect();
    assert_eq!(stages, vec![Stage::Plan, Stage::Static, Stage::Sandbox]);
    assert!(accepted.reports().iter().all(|(_, r)| r.approved));
    assert!(h.quarantine().is_empty());
}

#[test]
fn test_code_is_checked_against_an_approved_plan() {
    let h = Harness::new();
    let approved = h.pipeline.check_plan(&plan("doubler")).unwrap();
    assert!(approved.report().approved);
    assert_eq!(approved.plan().id, "doubler");

    let outcome = h.pipeline.check_code(&approved, DOUBLER);
    assert!(outcome.is_accepted());
    assert_eq!(outcome.history().last(), Some(&CandidateState::Accepted));
    let Outcome::Accepted(accepted) = outcome else {
        unreachable!();
    };
    assert_eq!(accepted.artifact().plan_id(), "doubler");
    assert_eq!(accepted.artifact().text(), DOUBLER);
    assert_eq!(accepted.plan().title, "Number doubler");
}

#[test]
fn test_unresolved_host_identifier_rejected_in_sandbox() {
    let h = Harness::new();
    let outcome = h.pipeline.evaluate(&plan("sneaky"), "let home = environment.HOME; home");
    let Outcome::Rejected(rejection) = outcome else {
        panic!("host identifiers must not resolve");
    };
    assert_eq!(rejection.stage, Stage::Sandbox);
    assert_eq!(rejection.kind(), Some(ErrorKind::SandboxRuntimeError));
}

// ─── Registry ───────────────────────────────────────────────────────────────

#[test]
fn test_register_and_invoke_doubler() {
    let h = Harness::new();
    let feature = h.register("doubler", DOUBLER);
    assert!(feature.active);
    assert!(feature.capabilities.contains(&Capability::Execute));
    assert_eq!(feature.invocation_count, 0);
    assert!(feature.source_location.exists());

    let result = h.registry.invoke("doubler", &json!({"value": 5})).unwrap();
    assert_eq!(result.result, json!({"doubled": 10}));
    assert_eq!(result.feature_id, "doubler");
    assert_eq!(result.entry, "execute");

    let feature = h.registry.get("doubler").unwrap();
    assert_eq!(feature.invocation_count, 1);
    assert!(feature.last_invoked_at.is_some());
}

#[test]
fn test_invoke_unknown_feature_is_not_found() {
    let h = Harness::new();
    let err = h.registry.invoke("nope", &json!({})).unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_deactivated_feature_is_inactive() {
    let h = Harness::new();
    h.register("doubler", DOUBLER);
    h.registry.invoke("doubler", &json!({"value": 1})).unwrap();

    assert!(h.registry.deactivate("doubler"));
    assert!(h.registry.deactivate("doubler"));
    assert!(!h.registry.get("doubler").unwrap().active);
    assert!(!h.registry.deactivate("unknown"));

    let err = h.registry.invoke("doubler", &json!({"value": 5})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inactive);
    assert_eq!(h.registry.get("doubler").unwrap().invocation_count, 1);
}

#[test]
fn test_deactivation_survives_reload_and_reregistration() {
    let h = Harness::new();
    h.register("doubler", DOUBLER);
    assert!(h.registry.deactivate("doubler"));

    let reloaded = h.registry.reload("doubler").unwrap();
    assert!(!reloaded.active);
    let err = h.registry.invoke("doubler", &json!({"value": 2})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inactive);

    let replaced = h.register("doubler", "fn execute(input) { #{ doubled: input.value + input.value } }");
    assert!(!replaced.active);
    assert_eq!(h.registry.invoke("doubler", &json!({"value": 2})).unwrap_err().kind(), ErrorKind::Inactive);

    h.registry.delete("doubler").unwrap();
    assert!(h.register("doubler", DOUBLER).active);
}

#[test]
fn test_round_trip_after_restart() {
    let h = Harness::new();
    let registered = h.register(
        "stats",
        "fn get() { #{ ok: true } }\nfn webhook(payload) { payload }\nfn schedule() { \"@hourly\" }",
    );

    let restarted = Harness::open_registry(&h.tmp, &h.executor);
    let loaded = restarted.load_all().unwrap();
    assert_eq!(loaded.len(), 1);
    let reloaded = &loaded[0];
    assert_eq!(reloaded.id, registered.id);
    assert_eq!(reloaded.category, registered.category);
    assert_eq!(reloaded.complexity, registered.complexity);
    assert_eq!(reloaded.capabilities, registered.capabilities);
    assert_eq!(reloaded.display_name, registered.display_name);
    assert_eq!(reloaded.created_at, registered.created_at);
    assert!(restarted.load_issues().is_empty());
}

#[test]
fn test_failed_self_test_stays_inactive_after_restart() {
    let h = Harness::new();
    let feature = h.register("sick", "fn execute(input) { 1 }\nfn health() { false }");
    assert!(!feature.active);
    h.register("doubler", DOUBLER);

    let restarted = Harness::open_registry(&h.tmp, &h.executor);
    let loaded = restarted.load_all().unwrap();
    assert_eq!(loaded.len(), 2);
    assert!(!restarted.get("sick").unwrap().active);
    assert!(restarted.get("doubler").unwrap().active);
    let err = restarted.invoke("sick", &json!({})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inactive);
}

#[test]
fn test_rescan_drops_features_whose_unit_is_gone() {
    let h = Harness::new();
    h.register("doubler", DOUBLER);
    h.register("echo", "fn execute(input) { input }");
    fs::remove_file(h.features_dir().join("echo.rhai")).unwrap();

    let loaded = h.registry.load_all().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(h.registry.len(), 1);
    assert!(h.registry.get("echo").is_none());
    let err = h.registry.invoke("echo", &json!({})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(h.registry.invoke("doubler", &json!({"value": 1})).is_ok());
}

#[test]
fn test_load_all_skips_broken_units() {
    let h = Harness::new();
    h.register("doubler", DOUBLER);
    let dir = h.features_dir();

    fs::write(dir.join("garbage.rhai"), "fn execute(x) { x }").unwrap();
    let meta = FeatureMetadata {
        id: "inert".to_string(),
        title: "Inert".to_string(),
        description: "no entry point".to_string(),
        category: Category::Data,
        complexity: Complexity::Low,
        created_at: Utc::now(),
    };
    h.registry.store().save("let x = 1; x", &meta).unwrap();
    let mismatched = FeatureMetadata {
        id: "other".to_string(),
        ..meta.clone()
    };
    fs::write(
        dir.join("renamed.rhai"),
        crate::artifact::render_persisted(DOUBLER, &mismatched).unwrap(),
    )
    .unwrap();

    let restarted = Harness::open_registry(&h.tmp, &h.executor);
    let loaded = restarted.load_all().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, "doubler");

    let issues = restarted.load_issues();
    assert_eq!(issues.len(), 3);
    assert!(issues.iter().any(|i| i.path.ends_with("garbage.rhai") && i.reason.contains("metadata")));
    assert!(issues.iter().any(|i| i.path.ends_with("inert.rhai") && i.reason.contains("entry point")));
    assert!(issues.iter().any(|i| i.path.ends_with("renamed.rhai")));
}

#[test]
fn test_delete_removes_artifact_and_entry() {
    let h = Harness::new();
    let feature = h.register("doubler", DOUBLER);
    h.registry.delete("doubler").unwrap();

    assert!(!feature.source_location.exists());
    assert!(h.registry.get("doubler").is_none());
    assert_eq!(h.registry.invoke("doubler", &json!({})).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(h.registry.delete("doubler").unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn test_delete_storage_error_leaves_state_unchanged() {
    let h = Harness::new();
    let feature = h.register("doubler", DOUBLER);
    // A directory where the artifact file should be makes removal fail.
    fs::remove_file(&feature.source_location).unwrap();
    fs::create_dir(&feature.source_location).unwrap();

    let err = h.registry.delete("doubler").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageError);
    assert!(feature.source_location.exists());
    assert!(h.registry.get("doubler").is_some());
    assert!(h.registry.invoke("doubler", &json!({"value": 2})).is_ok());
}

#[test]
fn test_hot_reload_swaps_code_and_keeps_counters() {
    let h = Harness::new();
    let feature = h.register("doubler", DOUBLER);
    h.registry.invoke("doubler", &json!({"value": 5})).unwrap();

    let (_, meta, _) = h.registry.store().read("doubler").unwrap();
    h.registry
        .store()
        .save("fn execute(input) { #{ tripled: input.value * 3 } }", &meta)
        .unwrap();
    let reloaded = h.registry.reload("doubler").unwrap();
    assert!(reloaded.loaded_at >= feature.loaded_at);

    let result = h.registry.invoke("doubler", &json!({"value": 5})).unwrap();
    assert_eq!(result.result, json!({"tripled": 15}));
    assert_eq!(h.registry.get("doubler").unwrap().invocation_count, 2);
    assert_eq!(h.registry.reload("missing").unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn test_reregistering_same_id_is_an_atomic_swap() {
    let h = Harness::new();
    h.register("doubler", DOUBLER);
    h.registry.invoke("doubler", &json!({"value": 1})).unwrap();

    h.register("doubler", "fn execute(input) { #{ doubled: input.value + input.value } }");
    assert_eq!(h.registry.len(), 1);
    let result = h.registry.invoke("doubler", &json!({"value": 4})).unwrap();
    assert_eq!(result.result, json!({"doubled": 8}));
    assert_eq!(h.registry.get("doubler").unwrap().invocation_count, 2);
}

#[test]
fn test_callee_failure_is_invocation_failed_and_stays_active() {
    let h = Harness::new();
    h.register(
        "picky",
        "fn execute(input) { if input.fail == true { throw \"boom\"; } input.value }",
    );
    let err = h.registry.invoke("picky", &json!({"fail": true, "value": 1})).unwrap_err();
    match &err {
        RegistryError::InvocationFailed { message, .. } => assert!(message.contains("boom")),
        other => panic!("unexpected error: {:?}", other),
    }
    let feature = h.registry.get("picky").unwrap();
    assert!(feature.active);
    assert_eq!(feature.failure_count, 1);
    assert_eq!(feature.invocation_count, 0);
}

#[test]
fn test_self_test_timeout_deactivates() {
    let h = Harness::with_limits(ResourceLimits::default().with_timeout(Duration::from_millis(200)));
    let feature = h.register("spinner", "fn execute(input) { let x = 0; while x >= 0 { x += 1; } x }");
    assert!(!feature.active);
    assert_eq!(h.registry.invoke("spinner", &json!({})).unwrap_err().kind(), ErrorKind::Inactive);
    assert_eq!(h.executor.live_contexts(), 0);
}

#[test]
fn test_failing_health_probe_deactivates() {
    let h = Harness::new();
    let feature = h.register("sick", "fn execute(input) { 1 }\nfn health() { false }");
    assert!(!feature.active);

    let feature = h.register("well", "fn execute(input) { 1 }\nfn health() { #{ ok: true } }");
    assert!(feature.active);
    assert!(h.registry.self_test("well").unwrap());
}

#[test]
fn test_self_test_tolerates_input_contract_errors() {
    let h = Harness::new();
    // `input.value` is missing from the synthetic input.
    let feature = h.register("doubler", DOUBLER);
    assert!(feature.active);
}

#[test]
fn test_dispatch_default_and_explicit_routes() {
    let h = Harness::new();
    h.register("doubler", DOUBLER);
    h.register(
        "counter",
        r#"
        fn routes() { [#{ method: "GET", path: "/count", handler: "count" }] }
        fn count() { #{ count: 3 } }
        fn get() { 0 }
        "#,
    );

    let result = h
        .registry
        .dispatch("post", "/features/doubler/execute", &json!({"value": 21}))
        .unwrap();
    assert_eq!(result.result, json!({"doubled": 42}));

    let result = h.registry.dispatch("GET", "/count/", &json!(null)).unwrap();
    assert_eq!(result.feature_id, "counter");
    assert_eq!(result.result, json!({"count": 3}));

    // An explicit table replaces the synthesized getter route.
    assert_eq!(
        h.registry.dispatch("GET", "/features/counter", &json!(null)).unwrap_err().kind(),
        ErrorKind::NotFound
    );

    h.registry.deactivate("counter");
    assert_eq!(
        h.registry.dispatch("GET", "/count", &json!(null)).unwrap_err().kind(),
        ErrorKind::Inactive
    );
}

#[test]
fn test_marker_only_feature_has_no_entry_point() {
    let h = Harness::new();
    let feature = h.register("hook", "fn webhook(payload) { payload }");
    assert!(feature.capabilities.contains(&Capability::Webhook));
    assert!(feature.routes.is_empty());
    let err = h.registry.invoke("hook", &json!({})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoEntryPoint);
}

#[test]
fn test_register_without_any_shape_is_not_persisted() {
    let h = Harness::new();
    let accepted = h.accept(&plan("inert"), "let x = 1; x");
    let err = h.registry.register(accepted).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoEntryPoint);
    assert!(h.registry.is_empty());
    assert!(!h.features_dir().join("inert.rhai").exists());
}

#[test]
fn test_concurrent_invocations_count_exactly() {
    let h = Harness::new();
    h.register("doubler", DOUBLER);
    std::thread::scope(|s| {
        for t in 0..4 {
            let registry = &h.registry;
            s.spawn(move || {
                for i in 0..5 {
                    let out = registry.invoke("doubler", &json!({"value": t * 10 + i})).unwrap();
                    assert_eq!(out.result, json!({"doubled": (t * 10 + i) * 2}));
                }
            });
        }
    });
    assert_eq!(h.registry.get("doubler").unwrap().invocation_count, 20);
}
