//! Recognized entry-point shapes and route derivation.
//!
//! The surface of a unit is probed once at load time from its public
//! functions; the result is stored with the registry entry and never re-probed
//! per call.

use featurelite_sandbox::{Program, SandboxExecutor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Self-test probe; not a capability.
pub const HEALTH_FUNCTION: &str = "health";

const ROUTE_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Execute,
    Get,
    Process,
    Validate,
    Routes,
    Scheduled,
    Webhook,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::Execute,
        Capability::Get,
        Capability::Process,
        Capability::Validate,
        Capability::Routes,
        Capability::Scheduled,
        Capability::Webhook,
    ];

    /// Probe order for `invoke`.
    pub const INVOCATION_ORDER: [Capability; 4] = [
        Capability::Execute,
        Capability::Get,
        Capability::Process,
        Capability::Validate,
    ];

    pub fn function_name(&self) -> &'static str {
        match self {
            Capability::Execute => "execute",
            Capability::Get => "get",
            Capability::Process => "process",
            Capability::Validate => "validate",
            Capability::Routes => "routes",
            Capability::Scheduled => "schedule",
            Capability::Webhook => "webhook",
        }
    }

    fn accepts_arity(&self, arity: usize) -> bool {
        match self {
            Capability::Routes | Capability::Scheduled => arity == 0,
            Capability::Webhook => arity == 1,
            _ => arity <= 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Execute => "execute",
            Capability::Get => "get",
            Capability::Process => "process",
            Capability::Validate => "validate",
            Capability::Routes => "routes",
            Capability::Scheduled => "scheduled",
            Capability::Webhook => "webhook",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub method: String,
    pub path: String,
    pub handler_name: String,
}

impl Route {
    fn new(method: &str, path: String, handler_name: &str) -> Self {
        Self {
            method: method.to_string(),
            path,
            handler_name: handler_name.to_string(),
        }
    }

    pub fn matches(&self, method: &str, path: &str) -> bool {
        self.method.eq_ignore_ascii_case(method) && normalize_path(&self.path) == normalize_path(path)
    }
}

fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Route table entry as a script returns it from `fn routes()`.
#[derive(Debug, Deserialize)]
struct ScriptRoute {
    method: String,
    path: String,
    handler: String,
}

/// Probed surface of a unit.
#[derive(Debug, Clone, Default)]
pub struct Surface {
    pub capabilities: BTreeSet<Capability>,
    pub routes: Vec<Route>,
    /// First invocable shape in `INVOCATION_ORDER`
    pub entry: Option<Capability>,
    pub has_health: bool,
}

/// Capabilities present in a compiled unit.
pub fn detect_capabilities(program: &Program) -> BTreeSet<Capability> {
    Capability::ALL
        .iter()
        .copied()
        .filter(|cap| {
            program
                .functions()
                .iter()
                .any(|f| f.name == cap.function_name() && cap.accepts_arity(f.arity))
        })
        .collect()
}

/// Probe a unit: capabilities, invocation entry, health probe and routes.
/// An explicit route table is evaluated inside the sandbox; otherwise default
/// routes are synthesized from the executable and getter shapes.
pub fn probe(feature_id: &str, program: &Program, executor: &SandboxExecutor) -> Result<Surface, String> {
    let capabilities = detect_capabilities(program);
    let entry = Capability::INVOCATION_ORDER
        .iter()
        .copied()
        .find(|cap| capabilities.contains(cap));
    let has_health = program.entry(HEALTH_FUNCTION).is_some();

    let routes = if capabilities.contains(&Capability::Routes) {
        route_table(program, executor)?
    } else {
        default_routes(feature_id, &capabilities)
    };

    Ok(Surface {
        capabilities,
        routes,
        entry,
        has_health,
    })
}

fn default_routes(feature_id: &str, capabilities: &BTreeSet<Capability>) -> Vec<Route> {
    let mut routes = Vec::new();
    if capabilities.contains(&Capability::Execute) {
        routes.push(Route::new(
            "POST",
            format!("/features/{}/execute", feature_id),
            Capability::Execute.function_name(),
        ));
    }
    if capabilities.contains(&Capability::Get) {
        routes.push(Route::new(
            "GET",
            format!("/features/{}", feature_id),
            Capability::Get.function_name(),
        ));
    }
    routes
}

fn route_table(program: &Program, executor: &SandboxExecutor) -> Result<Vec<Route>, String> {
    let run = executor.call(program, Capability::Routes.function_name(), &serde_json::Value::Null);
    let value = run
        .outcome
        .map_err(|e| format!("routes() failed: {}", e))?;
    let table: Vec<ScriptRoute> =
        serde_json::from_value(value).map_err(|e| format!("routes() returned an invalid table: {}", e))?;

    let mut routes = Vec::with_capacity(table.len());
    for raw in table {
        let method = raw.method.to_ascii_uppercase();
        if !ROUTE_METHODS.contains(&method.as_str()) {
            return Err(format!("route method '{}' is not supported", raw.method));
        }
        if !raw.path.starts_with('/') {
            return Err(format!("route path '{}' must start with '/'", raw.path));
        }
        if program.entry(&raw.handler).is_none() {
            return Err(format!(
                "route handler '{}' is not a function taking at most one argument",
                raw.handler
            ));
        }
        routes.push(Route {
            method,
            path: raw.path,
            handler_name: raw.handler,
        });
    }
    Ok(routes)
}
