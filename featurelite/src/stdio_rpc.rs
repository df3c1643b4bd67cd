//! Feature daemon: JSON-RPC 2.0 over stdio, over one live registry.
//!
//! **Entry**: `featurelite serve --stdio`
//!
//! Deactivation is in-memory only, so lifecycle operations (deactivate, reload,
//! dispatch, self_test) are meaningful only against a long-lived registry like
//! this one. One request → one response; requests run concurrently.
//!
//! Protocol:
//!
//! Request: `{"jsonrpc":"2.0","id":1,"method":"invoke"|"dispatch"|...,"params":{...}}`
//! Response: `{"jsonrpc":"2.0","id":1,"result":{...}}` or
//! `{"jsonrpc":"2.0","id":1,"error":{"code":-32603,"message":"...","data":{"kind":"NotFound"}}}`

use crate::runtime::Runtime;
use anyhow::Result;
use featurelite_core::error::ErrorKind;
use featurelite_core::plan::Plan;
use featurelite_registry::{Outcome, RegistryError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{self, BufRead, BufReader, Write};
use std::sync::{mpsc, Arc};
use std::thread;

/// Maximum JSON-RPC request size (10 MB) to prevent OOM DoS.
const MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

const INTERNAL_ERROR: i64 = -32603;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
    kind: Option<ErrorKind>,
}

impl RpcError {
    fn invalid_params(e: serde_json::Error) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: format!("Invalid params: {}", e),
            kind: None,
        }
    }

    fn to_json(&self) -> Value {
        let mut err = json!({"code": self.code, "message": self.message});
        if let Some(kind) = self.kind {
            err["data"] = json!({"kind": kind.as_str()});
        }
        err
    }
}

impl From<RegistryError> for RpcError {
    fn from(e: RegistryError) -> Self {
        Self {
            code: INTERNAL_ERROR,
            message: e.to_string(),
            kind: Some(e.kind()),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        Self {
            code: INTERNAL_ERROR,
            message: e.to_string(),
            kind: None,
        }
    }
}

type RpcResult = std::result::Result<Value, RpcError>;

/// Run the feature daemon until stdin closes.
pub fn serve_stdio(runtime: Runtime) -> Result<()> {
    let runtime = Arc::new(runtime);
    let (tx, rx) = mpsc::channel::<Value>();

    // Writer thread: stdout is not Sync
    let writer_handle = thread::spawn(move || -> Result<()> {
        let mut stdout = io::stdout();
        for resp in rx {
            writeln!(stdout, "{}", resp)?;
            stdout.flush()?;
        }
        Ok(())
    });

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin.lock());
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let mut pending = 0usize;

    loop {
        let line = match read_line_limited(&mut reader) {
            Ok(None) => break,
            Ok(Some(l)) => l,
            Err(e) => {
                let _ = tx.send(error_response(Value::Null, INTERNAL_ERROR, &format!("Request size error: {}", e)));
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        pending += 1;
        let tx = tx.clone();
        let done_tx = done_tx.clone();
        let runtime = Arc::clone(&runtime);
        rayon::spawn(move || {
            let _ = tx.send(handle_line(&runtime, line.trim()));
            let _ = done_tx.send(());
        });
    }

    for _ in 0..pending {
        let _ = done_rx.recv();
    }
    drop(tx);
    writer_handle
        .join()
        .map_err(|_| anyhow::anyhow!("Writer thread panicked"))??;
    Ok(())
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

/// Parse one request line and produce its response.
fn handle_line(runtime: &Runtime, line: &str) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return error_response(Value::Null, INTERNAL_ERROR, &format!("Parse error: {}", e)),
    };
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
    let params = request
        .get("params")
        .cloned()
        .unwrap_or(Value::Object(serde_json::Map::new()));

    match dispatch_request(runtime, method, params) {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err(e) => {
            tracing::debug!(method, "RPC error: {}", e.message);
            json!({"jsonrpc": "2.0", "id": id, "error": e.to_json()})
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Size-Limited Stdin Reader
// ═══════════════════════════════════════════════════════════════════════════════

/// Read a single line from `reader`, enforcing [`MAX_REQUEST_SIZE`].
/// Returns `Ok(None)` on EOF.
fn read_line_limited(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    loop {
        let available = match reader.fill_buf() {
            Ok(b) => b,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            return if buf.is_empty() { Ok(None) } else { into_line(buf).map(Some) };
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                if buf.len() + pos > MAX_REQUEST_SIZE {
                    reader.consume(pos + 1);
                    return Err(too_large());
                }
                buf.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                return into_line(buf).map(Some);
            }
            None => {
                let len = available.len();
                if buf.len() + len > MAX_REQUEST_SIZE {
                    reader.consume(len);
                    skip_until_newline(reader);
                    return Err(too_large());
                }
                buf.extend_from_slice(available);
                reader.consume(len);
            }
        }
    }
}

fn into_line(mut buf: Vec<u8>) -> io::Result<String> {
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    String::from_utf8(buf).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Invalid UTF-8"))
}

fn too_large() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "Request exceeds 10MB size limit")
}

fn skip_until_newline(reader: &mut impl BufRead) {
    loop {
        match reader.fill_buf() {
            Ok(b) if b.is_empty() => break,
            Ok(b) => {
                if let Some(pos) = b.iter().position(|&c| c == b'\n') {
                    reader.consume(pos + 1);
                    break;
                }
                let len = b.len();
                reader.consume(len);
            }
            Err(_) => break,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Methods
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Deserialize)]
struct InvokeParams {
    id: String,
    #[serde(default)]
    input: Value,
}

#[derive(Deserialize)]
struct DispatchParams {
    method: String,
    path: String,
    #[serde(default)]
    input: Value,
}

#[derive(Deserialize)]
struct SubmitParams {
    plan: Plan,
    code: String,
}

fn params<T: DeserializeOwned>(value: Value) -> std::result::Result<T, RpcError> {
    serde_json::from_value(value).map_err(RpcError::invalid_params)
}

fn dispatch_request(runtime: &Runtime, method: &str, p: Value) -> RpcResult {
    let registry = &runtime.registry;
    match method {
        "submit" => handle_submit(runtime, params(p)?),
        "invoke" => {
            let p: InvokeParams = params(p)?;
            Ok(serde_json::to_value(registry.invoke(&p.id, &p.input)?)?)
        }
        "dispatch" => {
            let p: DispatchParams = params(p)?;
            Ok(serde_json::to_value(registry.dispatch(&p.method, &p.path, &p.input)?)?)
        }
        "list" => Ok(serde_json::to_value(registry.list())?),
        "get" => {
            let p: IdParams = params(p)?;
            let feature = registry
                .get(&p.id)
                .ok_or_else(|| RegistryError::NotFound(p.id.clone()))?;
            Ok(serde_json::to_value(feature)?)
        }
        "deactivate" => {
            let p: IdParams = params(p)?;
            let registered = registry.deactivate(&p.id);
            Ok(json!({"id": p.id, "registered": registered}))
        }
        "reload" => {
            let p: IdParams = params(p)?;
            Ok(serde_json::to_value(registry.reload(&p.id)?)?)
        }
        "self_test" => {
            let p: IdParams = params(p)?;
            let passed = registry.self_test(&p.id)?;
            Ok(json!({"id": p.id, "passed": passed}))
        }
        "delete" => {
            let p: IdParams = params(p)?;
            registry.delete(&p.id)?;
            Ok(json!({"id": p.id, "deleted": true}))
        }
        "load_issues" => Ok(serde_json::to_value(registry.load_issues())?),
        _ => Err(RpcError {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {}", method),
            kind: None,
        }),
    }
}

/// A rejection is a normal result, not an RPC error.
fn handle_submit(runtime: &Runtime, p: SubmitParams) -> RpcResult {
    match runtime.pipeline.evaluate(&p.plan, &p.code) {
        Outcome::Accepted(accepted) => {
            let history = accepted.history().to_vec();
            let feature = runtime.registry.register(accepted)?;
            Ok(json!({"accepted": true, "history": history, "feature": feature}))
        }
        Outcome::Rejected(rejection) => Ok(json!({
            "accepted": false,
            "stage": rejection.stage,
            "kind": rejection.kind().map(|k| k.as_str()),
            "reason": rejection.reason(),
            "history": rejection.history(),
        })),
    }
}
