//! Capability table of the isolated context.
//!
//! Candidate code sees nothing of the host except what is registered here:
//! a clock, structured-data parsing, a capped logging sink and a module
//! loader that only resolves allow-listed built-in modules (`json`, `math`,
//! `text`). Everything else is an unresolved identifier or a missing function.

use crate::common::{LOG_MAX_LINES, LOG_MAX_LINE_CHARS};
use rhai::{
    Array, Dynamic, Engine, EvalAltResult, ImmutableString, Module, ModuleResolver, Position, FLOAT,
    INT,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

type FnResult<T> = Result<T, Box<EvalAltResult>>;

/// Built-in modules a script may `import`, subject to the allow-list.
pub const BUILTIN_MODULES: &[&str] = &["json", "math", "text"];

// ============================================================
// Logging sink
// ============================================================

/// Collects `print`/`debug`/`log` output of one run.
#[derive(Debug, Default, Clone)]
pub struct LogSink {
    lines: Vec<String>,
    dropped: usize,
}

pub type SharedLogSink = Arc<Mutex<LogSink>>;

impl LogSink {
    pub fn shared() -> SharedLogSink {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn push(&mut self, line: &str) {
        if self.lines.len() >= LOG_MAX_LINES {
            self.dropped += 1;
            return;
        }
        let kept: String = line.chars().take(LOG_MAX_LINE_CHARS).collect();
        tracing::debug!(target: "featurelite::sandbox", "{}", kept);
        self.lines.push(kept);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Lines discarded after the sink was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn take_lines(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

fn push_line(sink: &SharedLogSink, line: &str) {
    let mut guard = sink.lock().unwrap_or_else(|e| e.into_inner());
    guard.push(line);
}

// ============================================================
// Host functions
// ============================================================

/// Parse JSON text into interpreter values (objects become maps).
pub fn json_to_dynamic(text: &str) -> FnResult<Dynamic> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("Invalid JSON: {}", e))?;
    rhai::serde::to_dynamic(value)
}

pub fn dynamic_to_json(value: &Dynamic) -> FnResult<serde_json::Value> {
    rhai::serde::from_dynamic::<serde_json::Value>(value)
}

/// Register the global host functions: `now_ms`, `log`, `json_parse`,
/// `json_stringify`, and route `print`/`debug` to the sink.
pub fn register_host_functions(engine: &mut Engine, sink: &SharedLogSink) {
    let print_sink = Arc::clone(sink);
    engine.on_print(move |s| push_line(&print_sink, s));

    let debug_sink = Arc::clone(sink);
    engine.on_debug(move |s, _src, pos| push_line(&debug_sink, &format!("[debug {}] {}", pos, s)));

    let log_sink = Arc::clone(sink);
    engine.register_fn("log", move |msg: Dynamic| push_line(&log_sink, &msg.to_string()));

    engine.register_fn("now_ms", || -> INT { chrono::Utc::now().timestamp_millis() });
    engine.register_fn("json_parse", |text: &str| json_to_dynamic(text));
    engine.register_fn("json_stringify", |value: Dynamic| -> FnResult<String> {
        let json = dynamic_to_json(&value)?;
        Ok(json.to_string())
    });
}

// ============================================================
// Built-in modules
// ============================================================

fn json_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("parse", |text: ImmutableString| json_to_dynamic(&text));
    module.set_native_fn("stringify", |value: Dynamic| -> FnResult<String> {
        Ok(dynamic_to_json(&value)?.to_string())
    });
    module.set_native_fn("pretty", |value: Dynamic| -> FnResult<String> {
        let json = dynamic_to_json(&value)?;
        serde_json::to_string_pretty(&json).map_err(|e| e.to_string().into())
    });
    module.build_index();
    module
}

fn as_number(value: &Dynamic) -> FnResult<FLOAT> {
    if let Ok(i) = value.as_int() {
        return Ok(i as FLOAT);
    }
    value
        .as_float()
        .map_err(|t| format!("Expected a number, got {}", t).into())
}

fn math_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("sum", |items: Array| -> FnResult<Dynamic> {
        if items.iter().all(|v| v.is_int()) {
            let total = items.iter().filter_map(|v| v.as_int().ok()).fold(0 as INT, INT::saturating_add);
            return Ok(Dynamic::from_int(total));
        }
        let mut total: FLOAT = 0.0;
        for item in &items {
            total += as_number(item)?;
        }
        Ok(Dynamic::from_float(total))
    });
    module.set_native_fn("mean", |items: Array| -> FnResult<FLOAT> {
        if items.is_empty() {
            return Err("mean of an empty array".into());
        }
        let mut total: FLOAT = 0.0;
        for item in &items {
            total += as_number(item)?;
        }
        Ok(total / items.len() as FLOAT)
    });
    module.set_native_fn("clamp", |x: Dynamic, lo: Dynamic, hi: Dynamic| -> FnResult<Dynamic> {
        if let (Ok(x), Ok(lo), Ok(hi)) = (x.as_int(), lo.as_int(), hi.as_int()) {
            if lo > hi {
                return Err("clamp: lower bound above upper bound".into());
            }
            return Ok(Dynamic::from_int(x.clamp(lo, hi)));
        }
        let (x, lo, hi) = (as_number(&x)?, as_number(&lo)?, as_number(&hi)?);
        if lo.is_nan() || hi.is_nan() || lo > hi {
            return Err("clamp: lower bound above upper bound".into());
        }
        Ok(Dynamic::from_float(x.clamp(lo, hi)))
    });
    module.build_index();
    module
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn text_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("slugify", |text: ImmutableString| -> FnResult<String> {
        Ok(slugify(&text))
    });
    module.set_native_fn("word_count", |text: ImmutableString| -> FnResult<INT> {
        Ok(text.split_whitespace().count() as INT)
    });
    module.set_native_fn("truncate", |text: ImmutableString, max: INT| -> FnResult<String> {
        if max < 0 {
            return Err("truncate: negative length".into());
        }
        Ok(text.chars().take(max as usize).collect())
    });
    module.build_index();
    module
}

fn builtin_module(name: &str) -> Option<Module> {
    match name {
        "json" => Some(json_module()),
        "math" => Some(math_module()),
        "text" => Some(text_module()),
        _ => None,
    }
}

// ============================================================
// Module loader
// ============================================================

/// Resolves `import "name"` against the allow-list only. A request for any
/// other name fails inside the script with a module-not-found error and is
/// recorded as a security event.
pub struct AllowListResolver {
    modules: HashMap<String, Arc<Module>>,
}

impl AllowListResolver {
    pub fn new(allowed: &BTreeSet<String>) -> Self {
        for name in allowed.iter().filter(|n| !BUILTIN_MODULES.contains(&n.as_str())) {
            tracing::debug!(module = %name, "Allowed module has no built-in implementation");
        }
        let modules = allowed
            .iter()
            .filter_map(|name| builtin_module(name).map(|m| (name.clone(), Arc::new(m))))
            .collect();
        Self { modules }
    }

    pub fn module_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ModuleResolver for AllowListResolver {
    fn resolve(
        &self,
        _engine: &Engine,
        _source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> Result<Arc<Module>, Box<EvalAltResult>> {
        match self.modules.get(path) {
            Some(module) => Ok(module.clone()),
            None => {
                featurelite_core::observability::security_module_blocked(path);
                Err(Box::new(EvalAltResult::ErrorModuleNotFound(
                    format!("{} (not in allowed modules)", path),
                    pos,
                )))
            }
        }
    }
}
