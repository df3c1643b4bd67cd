//! Sandbox Executor: runs candidate code in an isolated `rhai` context.
//!
//! Every run gets a fresh engine on its own worker thread. The context has no
//! ambient host access (strict variables, `eval` disabled, enumerated host
//! functions, allow-listed modules) and is bounded by a wall-clock deadline and
//! a heap-growth ceiling. On timeout the worker is aborted and joined before
//! the result is reported, so the context is torn down rather than abandoned.

use crate::capabilities::{dynamic_to_json, register_host_functions, AllowListResolver, LogSink, SharedLogSink};
use crate::common::{
    ResourceLimits, DEADLINE_GRACE_MS, MAX_CALL_LEVELS, MAX_COLLECTION_ITEMS, MAX_EXPR_DEPTH,
    MAX_FUNCTION_EXPR_DEPTH, MAX_MODULES,
};
use crate::heap::HeapProbe;
use featurelite_core::error::ErrorKind;
use featurelite_core::report::{ReportMetrics, SandboxMetrics, Severity, ValidationReport};
use rhai::packages::{Package, StandardPackage};
use rhai::{Dynamic, Engine, EvalAltResult, FnAccess, Scope, AST};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const ABORT_NONE: u8 = 0;
const ABORT_TIMEOUT: u8 = 1;
const ABORT_MEMORY: u8 = 2;

/// Deadline is re-checked every this many interpreter operations.
const DEADLINE_CHECK_INTERVAL: u64 = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SandboxError {
    #[error("Compilation failed: {0}")]
    Compile(String),
    #[error("Execution exceeded {0} ms and was aborted")]
    Timeout(u64),
    #[error("Heap growth of {used} bytes exceeded limit of {limit} bytes")]
    MemoryExceeded { used: u64, limit: u64 },
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Function '{0}' is not defined")]
    MissingFunction(String),
    #[error("Sandbox worker failed: {0}")]
    Worker(String),
}

impl SandboxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SandboxError::Timeout(_) => ErrorKind::Timeout,
            SandboxError::MemoryExceeded { .. } => ErrorKind::MemoryExceeded,
            SandboxError::MissingFunction(_) => ErrorKind::NoEntryPoint,
            SandboxError::Compile(_) | SandboxError::Runtime(_) | SandboxError::Worker(_) => {
                ErrorKind::SandboxRuntimeError
            }
        }
    }

    /// Resource ceiling hit (as opposed to an error raised by the code itself).
    pub fn is_limit(&self) -> bool {
        matches!(self, SandboxError::Timeout(_) | SandboxError::MemoryExceeded { .. })
    }
}

/// Public top-level function of a compiled unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub arity: usize,
}

/// Compiled candidate code. Cheap to clone; the AST is shared.
#[derive(Clone)]
pub struct Program {
    ast: Arc<AST>,
    functions: Vec<FunctionSignature>,
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("functions", &self.functions)
            .finish()
    }
}

impl Program {
    pub fn functions(&self) -> &[FunctionSignature] {
        &self.functions
    }

    /// First public function named `name` taking zero or one argument.
    pub fn entry(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions
            .iter()
            .find(|f| f.name == name && f.arity <= 1)
    }
}

/// Outcome of one isolated run. Timing and heap growth are filled in on
/// failure as well as on success.
#[derive(Debug, Clone)]
pub struct SandboxRun {
    pub outcome: Result<serde_json::Value, SandboxError>,
    pub execution_time_ms: u64,
    pub memory_delta: u64,
    pub logs: Vec<String>,
}

impl SandboxRun {
    fn failed(err: SandboxError) -> Self {
        Self {
            outcome: Err(err),
            execution_time_ms: 0,
            memory_delta: 0,
            logs: Vec::new(),
        }
    }

    pub fn into_report(self) -> ValidationReport {
        let (report, return_value) = match self.outcome {
            Ok(value) => (
                ValidationReport::approve(format!(
                    "Sandbox run completed in {} ms",
                    self.execution_time_ms
                )),
                Some(value),
            ),
            Err(e) => (ValidationReport::reject(e.kind(), Severity::High, e.to_string()), None),
        };
        report.with_metrics(ReportMetrics::Sandbox(SandboxMetrics {
            execution_time: self.execution_time_ms,
            memory_delta: self.memory_delta,
            return_value,
        }))
    }
}

enum Task {
    /// Evaluate the top-level statements.
    Evaluate,
    /// Call a script function; top-level statements (imports) run first.
    Call { name: String, args: Vec<Dynamic> },
}

/// Decrements the live-context counter when the worker exits.
struct ContextGuard(Arc<AtomicUsize>);

impl ContextGuard {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SandboxExecutor {
    limits: ResourceLimits,
    live: Arc<AtomicUsize>,
}

impl SandboxExecutor {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Isolated contexts currently alive. Zero whenever no run is in flight.
    pub fn live_contexts(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn compile(&self, code: &str) -> Result<Program, SandboxError> {
        let engine = build_engine(&self.limits, &LogSink::shared());
        let ast = engine
            .compile(code)
            .map_err(|e| SandboxError::Compile(e.to_string()))?;
        let functions = ast
            .iter_functions()
            .filter(|f| matches!(f.access, FnAccess::Public))
            .map(|f| FunctionSignature {
                name: f.name.to_string(),
                arity: f.params.len(),
            })
            .collect();
        Ok(Program {
            ast: Arc::new(ast),
            functions,
        })
    }

    /// Pipeline stage: compile and evaluate the candidate's top level once.
    pub fn run(&self, code: &str) -> ValidationReport {
        match self.compile(code) {
            Ok(program) => self.evaluate(&program).into_report(),
            Err(e) => SandboxRun::failed(e).into_report(),
        }
    }

    pub fn evaluate(&self, program: &Program) -> SandboxRun {
        self.execute(Arc::clone(&program.ast), Task::Evaluate)
    }

    /// Call `entry` with `input`. A one-parameter function receives the input;
    /// a zero-parameter function is called without it.
    pub fn call(&self, program: &Program, entry: &str, input: &serde_json::Value) -> SandboxRun {
        let Some(signature) = program.entry(entry) else {
            return SandboxRun::failed(SandboxError::MissingFunction(entry.to_string()));
        };
        let args = if signature.arity == 1 {
            match rhai::serde::to_dynamic(input) {
                Ok(value) => vec![value],
                Err(e) => {
                    return SandboxRun::failed(SandboxError::Runtime(format!(
                        "Input cannot be converted: {}",
                        e
                    )))
                }
            }
        } else {
            Vec::new()
        };
        self.execute(
            Arc::clone(&program.ast),
            Task::Call {
                name: signature.name.clone(),
                args,
            },
        )
    }

    fn execute(&self, ast: Arc<AST>, task: Task) -> SandboxRun {
        let abort = Arc::new(AtomicU8::new(ABORT_NONE));
        let (tx, rx) = mpsc::channel();
        let limits = self.limits.clone();
        let live = Arc::clone(&self.live);
        let worker_abort = Arc::clone(&abort);
        let deadline = Instant::now() + limits.max_execution_duration;

        let spawned = thread::Builder::new()
            .name("featurelite-sandbox".to_string())
            .spawn(move || {
                let _context = ContextGuard::enter(live);
                let run = run_isolated(&limits, &ast, task, deadline, &worker_abort);
                let _ = tx.send(run);
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => return SandboxRun::failed(SandboxError::Worker(e.to_string())),
        };

        let wait = self.limits.max_execution_duration + Duration::from_millis(DEADLINE_GRACE_MS);
        let mut received = rx.recv_timeout(wait).ok();
        if received.is_none() {
            // The worker missed its own deadline check; force it out.
            let _ = abort.compare_exchange(ABORT_NONE, ABORT_TIMEOUT, Ordering::SeqCst, Ordering::SeqCst);
            tracing::warn!("Sandbox worker past deadline, aborting");
        }
        if handle.join().is_err() {
            return SandboxRun::failed(SandboxError::Worker("worker panicked".to_string()));
        }
        if received.is_none() {
            received = rx.try_recv().ok();
        }

        let mut run = received
            .unwrap_or_else(|| SandboxRun::failed(SandboxError::Worker("no result".to_string())));
        if abort.load(Ordering::SeqCst) == ABORT_TIMEOUT {
            run.outcome = Err(SandboxError::Timeout(self.limits.timeout_ms()));
        }
        if let Err(e) = &run.outcome {
            if e.is_limit() {
                tracing::warn!(
                    elapsed_ms = run.execution_time_ms,
                    memory_delta = run.memory_delta,
                    "Sandbox run aborted: {}",
                    e
                );
            }
        }
        run
    }
}

fn build_engine(limits: &ResourceLimits, sink: &SharedLogSink) -> Engine {
    let mut engine = Engine::new_raw();
    engine.register_global_module(StandardPackage::new().as_shared_module());
    engine.set_strict_variables(true);
    engine.disable_symbol("eval");
    engine.set_max_call_levels(MAX_CALL_LEVELS);
    engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_FUNCTION_EXPR_DEPTH);
    // Zero means unlimited to the interpreter.
    engine.set_max_string_size(limits.max_string_bytes().max(1));
    engine.set_max_array_size(MAX_COLLECTION_ITEMS);
    engine.set_max_map_size(MAX_COLLECTION_ITEMS);
    engine.set_max_modules(MAX_MODULES);
    engine.set_module_resolver(AllowListResolver::new(&limits.allowed_module_names));
    register_host_functions(&mut engine, sink);
    engine
}

/// Body of the worker thread. The engine, scope and log sink live and die here.
fn run_isolated(
    limits: &ResourceLimits,
    ast: &AST,
    task: Task,
    deadline: Instant,
    abort: &Arc<AtomicU8>,
) -> SandboxRun {
    let sink = LogSink::shared();
    let mut engine = build_engine(limits, &sink);

    let probe = HeapProbe::start();
    let max_heap = limits.max_heap_delta;
    let progress_abort = Arc::clone(abort);
    engine.on_progress(move |ops| {
        let reason = progress_abort.load(Ordering::SeqCst);
        if reason != ABORT_NONE {
            return Some(Dynamic::from(reason as i64));
        }
        if probe.current_growth() > max_heap {
            progress_abort.store(ABORT_MEMORY, Ordering::SeqCst);
            return Some(Dynamic::from(ABORT_MEMORY as i64));
        }
        if ops % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
            progress_abort.store(ABORT_TIMEOUT, Ordering::SeqCst);
            return Some(Dynamic::from(ABORT_TIMEOUT as i64));
        }
        None
    });

    let started = Instant::now();
    let mut scope = Scope::new();
    let result = match task {
        Task::Evaluate => engine.eval_ast_with_scope::<Dynamic>(&mut scope, ast),
        Task::Call { name, args } => engine.call_fn::<Dynamic>(&mut scope, ast, &name, args),
    };
    let execution_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let memory_delta = probe.peak_growth();

    let outcome = match result {
        Ok(_) if memory_delta > max_heap => Err(SandboxError::MemoryExceeded {
            used: memory_delta,
            limit: max_heap,
        }),
        Ok(value) => Ok(dynamic_to_json(&value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()))),
        Err(err) => Err(classify(*err, abort.load(Ordering::SeqCst), limits, memory_delta)),
    };

    drop(scope);
    drop(engine);
    let logs = sink.lock().map(|mut s| s.take_lines()).unwrap_or_default();

    SandboxRun {
        outcome,
        execution_time_ms,
        memory_delta,
        logs,
    }
}

fn classify(err: EvalAltResult, abort: u8, limits: &ResourceLimits, memory_delta: u64) -> SandboxError {
    match abort {
        ABORT_TIMEOUT => return SandboxError::Timeout(limits.timeout_ms()),
        ABORT_MEMORY => {
            return SandboxError::MemoryExceeded {
                used: memory_delta,
                limit: limits.max_heap_delta,
            }
        }
        _ => {}
    }
    match err {
        EvalAltResult::ErrorDataTooLarge(..) => SandboxError::MemoryExceeded {
            used: memory_delta,
            limit: limits.max_heap_delta,
        },
        other => SandboxError::Runtime(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn executor() -> SandboxExecutor {
        SandboxExecutor::new(ResourceLimits::default())
    }

    fn fast_executor() -> SandboxExecutor {
        SandboxExecutor::new(ResourceLimits::default().with_timeout(Duration::from_millis(200)))
    }

    #[test]
    fn test_run_reports_return_value_and_metrics() {
        let report = executor().run("let x = 21; x * 2");
        assert!(report.approved, "{}", report.reason);
        let m = report.sandbox_metrics().unwrap();
        assert_eq!(m.return_value, Some(json!(42)));
    }

    #[test]
    fn test_timeout_aborts_and_reclaims_context() {
        let exec = fast_executor();
        for _ in 0..3 {
            let started = Instant::now();
            let report = exec.run("let x = 0; while x >= 0 { x += 1; }");
            assert!(!report.approved);
            assert_eq!(report.kind, Some(ErrorKind::Timeout));
            assert!(started.elapsed() < Duration::from_secs(3));
            assert!(report.sandbox_metrics().unwrap().execution_time >= 150);
            assert_eq!(exec.live_contexts(), 0);
        }
    }

    #[test]
    fn test_heap_growth_over_limit_fails() {
        let exec = SandboxExecutor::new(
            ResourceLimits::default()
                .with_max_heap_delta(1024 * 1024)
                .with_timeout(Duration::from_secs(30)),
        );
        // 128 KiB per copy, each below the string ceiling.
        let report = exec.run(
            r#"
            let s = "x";
            for i in 0..17 { s += s; }
            let copies = [];
            for i in 0..16 { copies.push(s + i); }
            copies.len()
            "#,
        );
        assert!(!report.approved);
        assert_eq!(report.kind, Some(ErrorKind::MemoryExceeded));
        assert!(report.sandbox_metrics().unwrap().memory_delta > 1024 * 1024);
        assert_eq!(exec.live_contexts(), 0);
    }

    #[test]
    fn test_disallowed_module_fails_loudly() {
        let exec = SandboxExecutor::new(ResourceLimits::default().with_allowed_modules(&["math"]));
        let report = exec.run("import \"json\" as j; 1");
        assert!(!report.approved);
        assert_eq!(report.kind, Some(ErrorKind::SandboxRuntimeError));
        assert!(report.reason.contains("json"), "{}", report.reason);

        let report = exec.run("import \"fs\" as fs; 1");
        assert!(report.reason.contains("fs"));
    }

    #[test]
    fn test_allowed_modules_resolve() {
        let report = executor().run(
            r#"
            import "math" as m;
            import "text" as t;
            import "json" as j;
            #{ total: m::sum([1, 2, 3]), slug: t::slugify("Hello World"), raw: j::stringify([1]) }
            "#,
        );
        assert!(report.approved, "{}", report.reason);
        assert_eq!(
            report.sandbox_metrics().unwrap().return_value,
            Some(json!({"total": 6, "slug": "hello-world", "raw": "[1]"}))
        );
    }

    #[test]
    fn test_host_globals_are_unresolved() {
        let exec = executor();
        let report = exec.run("process.env");
        assert!(!report.approved);
        assert_eq!(report.kind, Some(ErrorKind::SandboxRuntimeError));

        let report = exec.run("read_file(\"/etc/passwd\")");
        assert!(!report.approved);

        let report = exec.run("eval(\"40 + 2\")");
        assert!(!report.approved);
    }

    #[test]
    fn test_call_entry_point_with_input() {
        let exec = executor();
        let program = exec
            .compile("fn execute(input) { #{ doubled: input.value * 2 } }")
            .unwrap();
        let run = exec.call(&program, "execute", &json!({"value": 5}));
        assert_eq!(run.outcome, Ok(json!({"doubled": 10})));
    }

    #[test]
    fn test_call_runs_imports_and_zero_arity() {
        let exec = executor();
        let program = exec
            .compile("import \"text\" as t;\nfn get() { t::word_count(\"a b c\") }")
            .unwrap();
        let run = exec.call(&program, "get", &json!(null));
        assert_eq!(run.outcome, Ok(json!(3)));
    }

    #[test]
    fn test_call_missing_function() {
        let exec = executor();
        let program = exec.compile("fn helper(a, b) { a + b }").unwrap();
        let run = exec.call(&program, "execute", &json!({}));
        let err = run.outcome.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoEntryPoint);
        // Two parameters is not a recognized entry shape.
        assert!(program.entry("helper").is_none());
    }

    #[test]
    fn test_runtime_error_carries_message() {
        let exec = executor();
        let program = exec.compile("fn execute(input) { throw \"bad input\"; }").unwrap();
        let run = exec.call(&program, "execute", &json!({}));
        match run.outcome {
            Err(SandboxError::Runtime(msg)) => assert!(msg.contains("bad input"), "{}", msg),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_logs_are_captured() {
        let exec = executor();
        let program = exec.compile("print(\"hello\"); log(\"world\"); 1").unwrap();
        let run = exec.evaluate(&program);
        assert_eq!(run.logs, vec!["hello".to_string(), "world".to_string()]);
    }

    #[test]
    fn test_program_lists_public_functions() {
        let program = executor()
            .compile("fn execute(input) { input }\nfn health() { true }\nprivate fn hidden() { 1 }")
            .unwrap();
        let names: Vec<&str> = program.functions().iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"execute"));
        assert!(names.contains(&"health"));
        assert!(!names.contains(&"hidden"));
    }
}
