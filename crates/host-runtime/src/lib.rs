//! # host-runtime
//!
//! Registry-integrated service host: a declaratively-registered set of
//! services, dispatched over a line-framed JSON-RPC 2.0 TCP protocol, kept
//! alive in a registry through heartbeats and a rolling-window health
//! controller, with remote configuration delivered through a long-poll
//! engine.
//!
//! A consuming binary builds a [`host_config::HostConfig`], implements
//! [`service::ServiceImpl`] for each of its services, and hands both to
//! [`host::Host::bootstrap`]:
//!
//! ```rust
//! use host_runtime::service::{param, MethodDescriptor, ParamType, ServiceImpl};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Greeter;
//!
//! impl ServiceImpl for Greeter {
//!     fn methods(&self) -> Vec<MethodDescriptor> {
//!         vec![MethodDescriptor::new(
//!             "greet",
//!             vec![param("name", ParamType::String, true)],
//!             Arc::new(|args| {
//!                 Box::pin(async move {
//!                     Ok(json!(format!("hello, {}", args[0].as_str().unwrap_or_default())))
//!                 })
//!             }),
//!         )]
//!     }
//! }
//!
//! # async fn wiring(implementation: Arc<dyn ServiceImpl>) {
//! let resolve = move |name: &str| if name == "greeter" { Some(Arc::clone(&implementation)) } else { None };
//! # let _ = resolve;
//! # }
//! ```

pub mod adapter;
pub mod configstream;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod heartbeat;
pub mod host;
pub mod metrics;
pub mod registrar;
pub mod service;
pub mod transport;

pub use adapter::{AdapterError, RegistryAdapter};
pub use configstream::{ConfigSink, ConfigStreamError};
pub use dispatcher::{dispatch_line, DispatchError};
pub use error::{Error, Result};
pub use health::{Adjustment, Gate, HealthRegistry, HealthState};
pub use heartbeat::tick as heartbeat_tick;
pub use host::Host;
pub use metrics::MetricsCollector;
pub use registrar::{register_all, ServiceEntry};
pub use service::{param, MethodDescriptor, ParamDescriptor, ParamType, ServiceError, ServiceImpl};
