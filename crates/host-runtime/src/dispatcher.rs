//! JSON-RPC dispatcher (component F, dispatch half).
//!
//! Parses one line-framed JSON-RPC 2.0 request, resolves it against the
//! registered [`ServiceEntry`] table, validates positional parameters
//! against the declared [`crate::service::ParamDescriptor`]s, invokes the
//! target, and records the outcome into the caller's [`HealthRegistry`].
//! The transport half (reading lines off a socket, queuing response bytes)
//! lives in [`crate::transport`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::health::HealthRegistry;
use crate::metrics::MetricsCollector;
use crate::registrar::ServiceEntry;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("connection io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, serde::Deserialize)]
struct RawRequest {
    jsonrpc: Option<Value>,
    method: Option<Value>,
    params: Option<Value>,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Serialize)]
struct RpcResponse<'a> {
    jsonrpc: &'static str,
    id: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorObject>,
}

fn success(id: &Value, result: Value) -> String {
    let response = RpcResponse {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    };
    serde_json::to_string(&response).expect("response always serializes")
}

fn failure(id: &Value, code: i64, message: impl Into<String>) -> String {
    let response = RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(ErrorObject {
            code,
            message: message.into(),
        }),
    };
    serde_json::to_string(&response).expect("response always serializes")
}

/// Dispatch one line of input (without its trailing newline) against the
/// registered service table. Always returns a complete JSON-RPC response
/// line (without a trailing newline); the transport layer appends `\n`.
///
/// Implements §4.F's nine-step dispatch algorithm exactly; every exit path
/// produces a response whose `id` matches the request's `id` (or JSON
/// `null` when the request itself could not be parsed or lacked an `id`).
#[instrument(skip(line, services, health, metrics), fields(tag = "tcp"))]
pub async fn dispatch_line(
    line: &str,
    services: &HashMap<String, ServiceEntry>,
    health: &HealthRegistry,
    metrics: &MetricsCollector,
    timeout_threshold: Duration,
) -> String {
    // Step 1: parse.
    let raw: RawRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(_) => return failure(&Value::Null, PARSE_ERROR, "parse error"),
    };

    let id = raw.id.unwrap_or(Value::Null);

    // Step 2: require jsonrpc == "2.0", method present, id present.
    let method = match raw.method {
        Some(Value::String(s)) => s,
        _ => return failure(&id, INVALID_REQUEST, "missing or invalid 'method'"),
    };
    match &raw.jsonrpc {
        Some(Value::String(s)) if s == "2.0" => {}
        _ => return failure(&id, INVALID_REQUEST, "missing or invalid 'jsonrpc' (must be \"2.0\")"),
    }
    if id.is_null() && !line.contains("\"id\"") {
        return failure(&id, INVALID_REQUEST, "missing 'id'");
    }

    // Step 3: split method on first '.'.
    let (identifier, func_name) = match method.split_once('.') {
        Some((a, b)) if !a.is_empty() && !b.is_empty() => (a, b),
        _ => {
            return failure(
                &id,
                INVALID_REQUEST,
                format!("malformed method string '{method}': expected '<identifier>.<funcName>'"),
            )
        }
    };

    // Step 4: resolve identifier.
    let entry = match services.get(identifier) {
        Some(e) => e,
        None => {
            let known: Vec<&str> = services.keys().map(String::as_str).collect();
            return failure(
                &id,
                METHOD_NOT_FOUND,
                format!("unknown identifier '{identifier}'; known identifiers: {known:?}"),
            );
        }
    };

    // Step 5: resolve real method through the contract alias map.
    let descriptor = match entry.resolve_method(func_name) {
        Some(m) => m,
        None => {
            return failure(
                &id,
                METHOD_NOT_FOUND,
                format!("method '{func_name}' not found on identifier '{identifier}'"),
            )
        }
    };

    // Step 6: validate params.
    let params = match raw.params {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return failure(
                &id,
                INVALID_PARAMS,
                "'params' must be a positional array, not an object or scalar",
            )
        }
    };

    let required = descriptor.required_count();
    if params.len() < required {
        return failure(
            &id,
            INVALID_PARAMS,
            format!(
                "method '{func_name}' requires {required} parameter(s), got {}",
                params.len()
            ),
        );
    }

    for (i, decl) in descriptor.params.iter().enumerate() {
        if let Some(value) = params.get(i) {
            if !decl.type_tag.matches(value) {
                return failure(
                    &id,
                    INVALID_PARAMS,
                    format!(
                        "parameter '{}' (position {i}) expects type '{}', got {value}",
                        decl.name,
                        decl.type_tag.tag()
                    ),
                );
            }
        }
    }

    // Step 7: invoke, measuring elapsed time.
    let t0 = Instant::now();
    let outcome = (descriptor.invoker)(params).await;
    let elapsed = t0.elapsed();
    let timeout = elapsed > timeout_threshold;

    // Steps 8/9: record the outcome and build the response. The registrar
    // pre-populates one `HealthState` per registered identifier at startup
    // (§3, "HealthState (per k)"), so a missing entry here would itself be
    // a registration bug rather than something dispatch should paper over.
    if let Some(mut state) = health.get_mut(identifier) {
        match outcome {
            Ok(result) => {
                state.record(timeout, false);
                metrics.record_call(identifier, elapsed, true);
                return success(&id, result);
            }
            Err(e) => {
                state.record(timeout, true);
                metrics.record_call(identifier, elapsed, false);
                warn!(tag = "error", identifier, func_name, error = %e, "method invocation failed");
                return failure(&id, INTERNAL_ERROR, format!("method invocation: {e}"));
            }
        }
    }

    match outcome {
        Ok(result) => {
            metrics.record_call(identifier, elapsed, true);
            success(&id, result)
        }
        Err(e) => {
            metrics.record_call(identifier, elapsed, false);
            failure(&id, INTERNAL_ERROR, format!("method invocation: {e}"))
        }
    }
}
