//! Declarative service registration — the static-typing replacement for the
//! source's runtime class reflection (design notes, "reflection-based
//! parameter schema").
//!
//! Rather than introspecting a class's public methods at runtime, each
//! [`ServiceImpl`] *declares* its own method table: a name, an ordered list
//! of [`ParamDescriptor`]s, and an `invoker` closure taking a positional
//! argument list. The dispatcher never needs to know the implementation's
//! concrete type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The primitive parameter types the dispatcher can validate positionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Float,
    Bool,
    String,
    Mixed,
}

impl ParamType {
    /// Whether a decoded JSON value satisfies this declared type. `Mixed`
    /// matches anything.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            ParamType::Mixed => true,
            ParamType::Int => value.is_i64() || value.is_u64(),
            ParamType::Float => value.is_f64() || value.is_i64() || value.is_u64(),
            ParamType::Bool => value.is_boolean(),
            ParamType::String => value.is_string(),
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::String => "string",
            ParamType::Mixed => "mixed",
        }
    }
}

/// One declared parameter: its name (for error messages), its primitive
/// type, and whether it is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: ParamType,
    pub required: bool,
}

pub fn param(name: impl Into<String>, type_tag: ParamType, required: bool) -> ParamDescriptor {
    ParamDescriptor {
        name: name.into(),
        type_tag,
        required,
    }
}

/// Raised by a service method invocation. Carries only a message; the
/// dispatcher is responsible for mapping this into a JSON-RPC `-32603`.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ServiceError(pub String);

impl ServiceError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type Invoker =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, ServiceError>> + Send + Sync>;

/// A single invokable method: its name, declared parameters, and the
/// closure that performs the call.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub params: Vec<ParamDescriptor>,
    pub invoker: Invoker,
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, params: Vec<ParamDescriptor>, invoker: Invoker) -> Self {
        Self {
            name: name.into(),
            params,
            invoker,
        }
    }

    pub fn required_count(&self) -> usize {
        self.params.iter().filter(|p| p.required).count()
    }
}

/// Implemented by every in-process service bound to an identifier. Standing
/// in for the source's runtime class reflection: the implementation
/// declares its own method table instead of being introspected.
pub trait ServiceImpl: Send + Sync + 'static {
    fn methods(&self) -> Vec<MethodDescriptor>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mixed_matches_anything() {
        assert!(ParamType::Mixed.matches(&json!(null)));
        assert!(ParamType::Mixed.matches(&json!([1, 2])));
    }

    #[test]
    fn int_rejects_string() {
        assert!(!ParamType::Int.matches(&json!("18")));
        assert!(ParamType::Int.matches(&json!(18)));
    }

    #[test]
    fn string_rejects_number() {
        assert!(!ParamType::String.matches(&json!(18)));
        assert!(ParamType::String.matches(&json!("tom")));
    }

    #[test]
    fn float_accepts_integers_too() {
        assert!(ParamType::Float.matches(&json!(18)));
        assert!(ParamType::Float.matches(&json!(18.5)));
    }

    #[test]
    fn required_count_counts_only_required_params() {
        let method = MethodDescriptor::new(
            "add",
            vec![
                param("name", ParamType::String, true),
                param("age", ParamType::Int, true),
                param("nickname", ParamType::String, false),
            ],
            Arc::new(|_args| Box::pin(async { Ok(Value::Null) })),
        );
        assert_eq!(method.required_count(), 2);
    }
}
