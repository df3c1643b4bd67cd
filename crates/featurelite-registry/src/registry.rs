//! Feature Registry: the set of accepted, runnable features.
//!
//! The in-memory map is the one state shared across concurrent requests. It
//! is guarded by a single `RwLock`; entries are immutable `Arc`s, so a hot
//! reload builds the new entry completely and swaps it in one step. Usage
//! counters live behind their own mutex, shared across swaps of the same id.
//! Invocation clones the entry and releases the map lock before running code.

use crate::artifact::FeatureMetadata;
use crate::capability::{probe, Capability, Route, Surface, HEALTH_FUNCTION};
use crate::error::RegistryError;
use crate::pipeline::Accepted;
use crate::store::FeatureStore;
use chrono::{DateTime, Utc};
use featurelite_core::error::ErrorKind;
use featurelite_core::observability;
use featurelite_core::plan::{Category, Complexity};
use featurelite_sandbox::{Program, SandboxExecutor};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Default)]
struct UsageStats {
    invocation_count: u64,
    failure_count: u64,
    last_invoked_at: Option<DateTime<Utc>>,
}

struct FeatureEntry {
    meta: FeatureMetadata,
    program: Program,
    surface: Surface,
    source_location: PathBuf,
    loaded_at: DateTime<Utc>,
    active: AtomicBool,
    usage: Arc<Mutex<UsageStats>>,
}

impl FeatureEntry {
    fn usage(&self) -> UsageStats {
        self.usage.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Snapshot of a feature for callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub category: Category,
    pub complexity: Complexity,
    pub capabilities: BTreeSet<Capability>,
    pub routes: Vec<Route>,
    pub source_location: PathBuf,
    pub created_at: DateTime<Utc>,
    pub loaded_at: DateTime<Utc>,
    pub last_invoked_at: Option<DateTime<Utc>>,
    pub invocation_count: u64,
    pub failure_count: u64,
    pub active: bool,
}

/// Callee result wrapped with the feature identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub feature_id: String,
    pub entry: String,
    pub result: Value,
    pub execution_time_ms: u64,
    pub logs: Vec<String>,
}

/// A unit skipped by `load_all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadIssue {
    pub path: PathBuf,
    pub reason: String,
}

pub struct FeatureRegistry {
    store: FeatureStore,
    executor: Arc<SandboxExecutor>,
    entries: RwLock<HashMap<String, Arc<FeatureEntry>>>,
    load_issues: Mutex<Vec<LoadIssue>>,
}

impl FeatureRegistry {
    pub fn new(store: FeatureStore, executor: Arc<SandboxExecutor>) -> Self {
        Self {
            store,
            executor,
            entries: RwLock::new(HashMap::new()),
            load_issues: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &FeatureStore {
        &self.store
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<FeatureEntry>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<FeatureEntry>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lookup(&self, id: &str) -> Result<Arc<FeatureEntry>, RegistryError> {
        self.read_entries()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    // ─── Loading ────────────────────────────────────────────────────────────

    /// Scan the storage root. A unit that fails to parse, compile or expose a
    /// recognized shape is skipped and recorded in `load_issues`. Every loaded
    /// unit is self-tested; entries whose unit is gone or no longer loads are
    /// dropped.
    pub fn load_all(&self) -> Result<Vec<Feature>, RegistryError> {
        let paths = self.store.list()?;
        let mut loaded = Vec::new();
        let mut issues = Vec::new();

        for path in paths {
            match self.load_unit(&path) {
                Ok(entry) => {
                    let entry = self.install(entry);
                    self.run_self_test(&entry);
                    loaded.push(snapshot(&entry));
                }
                Err(reason) => {
                    tracing::warn!(path = %path.display(), "Skipping feature: {}", reason);
                    issues.push(LoadIssue { path, reason });
                }
            }
        }

        let kept: BTreeSet<&str> = loaded.iter().map(|f| f.id.as_str()).collect();
        self.write_entries().retain(|id, _| {
            let keep = kept.contains(id.as_str());
            if !keep {
                tracing::info!(feature_id = %id, "Dropping feature no longer present in storage");
            }
            keep
        });

        featurelite_sandbox::info_log!(
            "Loaded {} feature(s) from {} ({} skipped)",
            loaded.len(),
            self.store.root().display(),
            issues.len()
        );
        *self.load_issues.lock().unwrap_or_else(|e| e.into_inner()) = issues;
        Ok(loaded)
    }

    fn load_unit(&self, path: &Path) -> Result<FeatureEntry, String> {
        let (code, meta) = FeatureStore::read_path(path).map_err(|e| e.to_string())?;
        let expected = self.store.path_for(&meta.id).map_err(|e| e.to_string())?;
        if expected.file_name() != path.file_name() {
            return Err(format!("metadata id '{}' does not match the file name", meta.id));
        }
        let program = self.compile(&meta.id, &code).map_err(|e| e.to_string())?;
        self.build_entry(meta, program, path.to_path_buf())
            .map_err(|e| e.to_string())
    }

    pub fn load_issues(&self) -> Vec<LoadIssue> {
        self.load_issues.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn compile(&self, id: &str, code: &str) -> Result<Program, RegistryError> {
        self.executor.compile(code).map_err(|e| RegistryError::Load {
            id: id.to_string(),
            message: e.to_string(),
        })
    }

    fn build_entry(
        &self,
        meta: FeatureMetadata,
        program: Program,
        source_location: PathBuf,
    ) -> Result<FeatureEntry, RegistryError> {
        let surface = probe(&meta.id, &program, &self.executor).map_err(|message| RegistryError::Load {
            id: meta.id.clone(),
            message,
        })?;
        if surface.capabilities.is_empty() {
            return Err(RegistryError::NoEntryPoint(meta.id));
        }
        Ok(FeatureEntry {
            meta,
            program,
            surface,
            source_location,
            loaded_at: Utc::now(),
            active: AtomicBool::new(true),
            usage: Arc::new(Mutex::new(UsageStats::default())),
        })
    }

    /// Swap `entry` in under the write lock. Usage counters of a previous
    /// entry with the same id carry over, and so does a deactivation: only
    /// `delete` or a restart clears it.
    fn install(&self, mut entry: FeatureEntry) -> Arc<FeatureEntry> {
        let mut entries = self.write_entries();
        if let Some(previous) = entries.get(&entry.meta.id) {
            entry.usage = Arc::clone(&previous.usage);
            if !previous.active.load(Ordering::SeqCst) {
                entry.active.store(false, Ordering::SeqCst);
            }
        }
        let entry = Arc::new(entry);
        entries.insert(entry.meta.id.clone(), Arc::clone(&entry));
        entry
    }

    // ─── Registration ───────────────────────────────────────────────────────

    /// Materialize an accepted candidate: probe its surface, persist it, swap
    /// it in, then self-test it.
    pub fn register(&self, accepted: Accepted) -> Result<Feature, RegistryError> {
        let Accepted {
            artifact,
            plan,
            program,
            ..
        } = accepted;
        let meta = FeatureMetadata::from_plan(&plan, Utc::now()).ok_or_else(|| RegistryError::Load {
            id: plan.id.clone(),
            message: "plan lacks category or complexity".to_string(),
        })?;
        let target = self.store.path_for(&meta.id)?;
        let mut entry = self.build_entry(meta, program, target)?;
        entry.source_location = self.store.save(artifact.text(), &entry.meta)?;

        let replaced = self.read_entries().contains_key(&entry.meta.id);
        let entry = self.install(entry);
        self.announce(&entry, &artifact.code_hash(), replaced);
        self.run_self_test(&entry);
        Ok(snapshot(&entry))
    }

    /// Hot reload: rebuild the entry from its persisted artifact and swap it in.
    pub fn reload(&self, id: &str) -> Result<Feature, RegistryError> {
        self.lookup(id)?;
        let (code, meta, path) = self.store.read(id)?;
        if meta.id != id {
            return Err(RegistryError::Load {
                id: id.to_string(),
                message: format!("persisted metadata names '{}'", meta.id),
            });
        }
        let program = self.compile(id, &code)?;
        let entry = self.install(self.build_entry(meta, program, path)?);
        self.announce(&entry, &observability::code_hash(&code), true);
        self.run_self_test(&entry);
        Ok(snapshot(&entry))
    }

    fn announce(&self, entry: &FeatureEntry, code_hash: &str, reload: bool) {
        let capabilities: Vec<String> = entry
            .surface
            .capabilities
            .iter()
            .map(|c| c.to_string())
            .collect();
        observability::audit_feature_registered(&entry.meta.id, code_hash, &capabilities, reload);
        featurelite_sandbox::info_log!(
            "{} feature '{}' [{}]",
            if reload { "Reloaded" } else { "Registered" },
            entry.meta.id,
            capabilities.join(", ")
        );
    }

    // ─── Self-test ──────────────────────────────────────────────────────────

    /// Re-run the self-test of a registered feature. Returns whether it
    /// passed; a failure deactivates the feature.
    pub fn self_test(&self, id: &str) -> Result<bool, RegistryError> {
        let entry = self.lookup(id)?;
        Ok(self.run_self_test(&entry))
    }

    fn run_self_test(&self, entry: &FeatureEntry) -> bool {
        match self.check_self_test(entry) {
            Ok(()) => true,
            Err((kind, reason)) => {
                tracing::warn!(feature_id = %entry.meta.id, kind = %kind, "Self-test failed: {}", reason);
                observability::audit_self_test_failed(&entry.meta.id, kind.as_str(), &reason);
                self.deactivate_entry(entry, "self_test");
                false
            }
        }
    }

    /// Synthetic input cannot satisfy arbitrary input contracts, so an error
    /// raised by the entry point is only logged; hitting a resource ceiling or
    /// a failing health probe is a failure.
    fn check_self_test(&self, entry: &FeatureEntry) -> Result<(), (ErrorKind, String)> {
        if let Some(cap) = entry.surface.entry {
            let run = self
                .executor
                .call(&entry.program, cap.function_name(), &json!({ "selfTest": true }));
            match run.outcome {
                Err(e) if e.is_limit() => return Err((e.kind(), e.to_string())),
                Err(e) => tracing::warn!(
                    feature_id = %entry.meta.id,
                    "Entry point rejected synthetic self-test input: {}",
                    e
                ),
                Ok(_) => {}
            }
        }

        if entry.surface.has_health {
            let run = self.executor.call(&entry.program, HEALTH_FUNCTION, &Value::Null);
            match run.outcome {
                Ok(Value::Bool(false)) => {
                    return Err((ErrorKind::InvocationFailed, "health probe returned false".to_string()))
                }
                Ok(Value::Object(map)) if map.get("ok") == Some(&Value::Bool(false)) => {
                    return Err((ErrorKind::InvocationFailed, "health probe reported ok: false".to_string()))
                }
                Ok(_) => {}
                Err(e) => return Err((e.kind(), format!("health probe failed: {}", e))),
            }
        }
        Ok(())
    }

    // ─── Invocation ─────────────────────────────────────────────────────────

    /// Invoke the first recognized entry point (execute, get, process, validate).
    pub fn invoke(&self, id: &str, input: &Value) -> Result<InvocationResult, RegistryError> {
        let entry = self.lookup(id)?;
        if !entry.active.load(Ordering::SeqCst) {
            return Err(RegistryError::Inactive(id.to_string()));
        }
        let cap = entry
            .surface
            .entry
            .ok_or_else(|| RegistryError::NoEntryPoint(id.to_string()))?;
        self.run_handler(&entry, cap.function_name(), input)
    }

    /// Route an external request to the feature owning `method path`.
    pub fn dispatch(&self, method: &str, path: &str, input: &Value) -> Result<InvocationResult, RegistryError> {
        let mut candidates: Vec<(Arc<FeatureEntry>, String)> = self
            .read_entries()
            .values()
            .filter_map(|entry| {
                entry
                    .surface
                    .routes
                    .iter()
                    .find(|r| r.matches(method, path))
                    .map(|r| (Arc::clone(entry), r.handler_name.clone()))
            })
            .collect();
        candidates.sort_by(|a, b| {
            let a_active = a.0.active.load(Ordering::SeqCst);
            let b_active = b.0.active.load(Ordering::SeqCst);
            b_active.cmp(&a_active).then_with(|| a.0.meta.id.cmp(&b.0.meta.id))
        });

        let (entry, handler) = candidates
            .into_iter()
            .next()
            .ok_or_else(|| RegistryError::NotFound(format!("{} {}", method.to_ascii_uppercase(), path)))?;
        if !entry.active.load(Ordering::SeqCst) {
            return Err(RegistryError::Inactive(entry.meta.id.clone()));
        }
        self.run_handler(&entry, &handler, input)
    }

    fn run_handler(&self, entry: &FeatureEntry, function: &str, input: &Value) -> Result<InvocationResult, RegistryError> {
        let id = &entry.meta.id;
        let run = self.executor.call(&entry.program, function, input);
        let success = run.outcome.is_ok();
        {
            let mut usage = entry.usage.lock().unwrap_or_else(|e| e.into_inner());
            if success {
                usage.invocation_count += 1;
                usage.last_invoked_at = Some(Utc::now());
            } else {
                usage.failure_count += 1;
            }
        }
        observability::audit_feature_invoked(id, function, success, run.execution_time_ms);

        match run.outcome {
            Ok(result) => Ok(InvocationResult {
                feature_id: id.clone(),
                entry: function.to_string(),
                result,
                execution_time_ms: run.execution_time_ms,
                logs: run.logs,
            }),
            Err(e) => {
                tracing::warn!(feature_id = %id, entry = function, "Invocation failed: {}", e);
                Err(RegistryError::InvocationFailed {
                    id: id.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Mark a feature inactive. Idempotent; an unknown id is a no-op.
    /// Returns whether the id is registered.
    pub fn deactivate(&self, id: &str) -> bool {
        match self.lookup(id) {
            Ok(entry) => {
                self.deactivate_entry(&entry, "requested");
                true
            }
            Err(_) => false,
        }
    }

    fn deactivate_entry(&self, entry: &FeatureEntry, cause: &str) {
        if entry.active.swap(false, Ordering::SeqCst) {
            observability::audit_feature_deactivated(&entry.meta.id, cause);
            featurelite_sandbox::info_log!("Deactivated feature '{}' ({})", entry.meta.id, cause);
        }
    }

    /// Remove the artifact and the entry together. A storage error leaves both
    /// in place.
    pub fn delete(&self, id: &str) -> Result<(), RegistryError> {
        let mut entries = self.write_entries();
        if !entries.contains_key(id) {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        if !self.store.delete(id)? {
            tracing::warn!(feature_id = %id, "Artifact already missing from storage");
        }
        entries.remove(id);
        drop(entries);
        observability::audit_feature_deleted(id);
        featurelite_sandbox::info_log!("Deleted feature '{}'", id);
        Ok(())
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<Feature> {
        self.lookup(id).ok().map(|entry| snapshot(&entry))
    }

    /// All features, sorted by id.
    pub fn list(&self) -> Vec<Feature> {
        let entries: Vec<Arc<FeatureEntry>> = self.read_entries().values().cloned().collect();
        let mut features: Vec<Feature> = entries.iter().map(|e| snapshot(e)).collect();
        features.sort_by(|a, b| a.id.cmp(&b.id));
        features
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn snapshot(entry: &FeatureEntry) -> Feature {
    let usage = entry.usage();
    Feature {
        id: entry.meta.id.clone(),
        display_name: entry.meta.title.clone(),
        description: entry.meta.description.clone(),
        category: entry.meta.category,
        complexity: entry.meta.complexity,
        capabilities: entry.surface.capabilities.clone(),
        routes: entry.surface.routes.clone(),
        source_location: entry.source_location.clone(),
        created_at: entry.meta.created_at,
        loaded_at: entry.loaded_at,
        last_invoked_at: usage.last_invoked_at,
        invocation_count: usage.invocation_count,
        failure_count: usage.failure_count,
        active: entry.active.load(Ordering::SeqCst),
    }
}
