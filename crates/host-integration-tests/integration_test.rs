//! Cross-module integration tests: registrar + health + dispatcher wired
//! together the way [`host_runtime::host::Host`] wires them, against a
//! mocked registry endpoint.

use host_runtime::dispatcher::dispatch_line;
use host_runtime::health::{new_registry, Gate};
use host_runtime::registrar::register_all;
use host_runtime::MetricsCollector;
use host_runtime::service::{param, MethodDescriptor, ParamType, ServiceImpl};
use host_runtime::RegistryAdapter;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Calculator;

impl ServiceImpl for Calculator {
    fn methods(&self) -> Vec<MethodDescriptor> {
        vec![
            MethodDescriptor::new(
                "add",
                vec![param("a", ParamType::Int, true), param("b", ParamType::Int, true)],
                Arc::new(|args| {
                    Box::pin(async move {
                        let a = args[0].as_i64().unwrap_or_default();
                        let b = args[1].as_i64().unwrap_or_default();
                        Ok(json!(a + b))
                    })
                }),
            ),
            MethodDescriptor::new(
                "fail",
                vec![],
                Arc::new(|_args| {
                    Box::pin(async move {
                        Err(host_runtime::service::ServiceError::new("always fails"))
                    })
                }),
            ),
        ]
    }
}

async fn mock_registry() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nacos/v1/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "tok",
            "tokenTtl": 3600,
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/nacos/v1/ns/instance"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    server
}

fn toml_service(enable: bool) -> HashMap<String, host_config::ServiceSpec> {
    let toml = format!(
        r#"
[server]
host = "http://ignored"
username = "nacos"
password = "nacos"

[instance]
ip = "10.0.0.5"
port = 9000

[service.calc]
enable = {enable}
serviceName = "calculator"

[service.calc.contract]
sum = "add"
"#
    );
    let config = host_config::parse_config_from_str(&toml).unwrap();
    config.service
}

/// Scenario 1 from the host-level invariants: a resolved method dispatches
/// and the successful outcome is recorded in the health window.
#[tokio::test]
async fn basic_dispatch_round_trip_through_registrar() {
    let server = mock_registry().await;
    let adapter = RegistryAdapter::new(server.uri(), "nacos", "nacos");
    let health = new_registry();

    let services = toml_service(true);
    let resolve = |name: &str| -> Option<Arc<dyn ServiceImpl>> {
        (name == "calculator").then(|| Arc::new(Calculator) as Arc<dyn ServiceImpl>)
    };

    let entries = register_all(&services, 100.0, 50, Duration::from_secs(30), &adapter, &health, "10.0.0.5", 9000, resolve)
        .await
        .unwrap();
    let metrics = MetricsCollector::new();

    let line = r#"{"jsonrpc":"2.0","method":"calc.add","params":[2,3],"id":"1"}"#;
    let response: Value =
        serde_json::from_str(&dispatch_line(line, &entries, &health, &metrics, Duration::from_millis(3000)).await).unwrap();
    assert_eq!(response["result"], 5);
    assert_eq!(health.get("calc").unwrap().window_len(), 1);
}

/// Scenario 2: contract aliasing routes `calc.sum` to the real `add` method.
#[tokio::test]
async fn contract_alias_resolves_through_registered_entry() {
    let server = mock_registry().await;
    let adapter = RegistryAdapter::new(server.uri(), "nacos", "nacos");
    let health = new_registry();
    let services = toml_service(true);
    let resolve = |name: &str| -> Option<Arc<dyn ServiceImpl>> {
        (name == "calculator").then(|| Arc::new(Calculator) as Arc<dyn ServiceImpl>)
    };
    let entries = register_all(&services, 100.0, 50, Duration::from_secs(30), &adapter, &health, "10.0.0.5", 9000, resolve)
        .await
        .unwrap();
    let metrics = MetricsCollector::new();

    let line = r#"{"jsonrpc":"2.0","method":"calc.sum","params":[10,20],"id":"2"}"#;
    let response: Value =
        serde_json::from_str(&dispatch_line(line, &entries, &health, &metrics, Duration::from_millis(3000)).await).unwrap();
    assert_eq!(response["result"], 30);
}

/// Scenario 3/4: repeated errors close the gate, repeated successes reopen it.
#[tokio::test]
async fn repeated_errors_close_the_gate_then_recover() {
    let server = mock_registry().await;
    let adapter = RegistryAdapter::new(server.uri(), "nacos", "nacos");
    let health = new_registry();
    let services = toml_service(true);
    let resolve = |name: &str| -> Option<Arc<dyn ServiceImpl>> {
        (name == "calculator").then(|| Arc::new(Calculator) as Arc<dyn ServiceImpl>)
    };
    let entries = register_all(&services, 100.0, 10, Duration::from_secs(0), &adapter, &health, "10.0.0.5", 9000, resolve)
        .await
        .unwrap();
    let metrics = MetricsCollector::new();

    let failing = r#"{"jsonrpc":"2.0","method":"calc.fail","params":[],"id":"e"}"#;
    for _ in 0..10 {
        let _ = dispatch_line(failing, &entries, &health, &metrics, Duration::from_millis(3000)).await;
    }

    let now = std::time::Instant::now();
    {
        let mut state = health.get_mut("calc").unwrap();
        state.evaluate(now);
    }
    assert_eq!(health.get("calc").unwrap().gate(), Gate::Closed);

    let ok = r#"{"jsonrpc":"2.0","method":"calc.add","params":[1,1],"id":"ok"}"#;
    for _ in 0..10 {
        let _ = dispatch_line(ok, &entries, &health, &metrics, Duration::from_millis(3000)).await;
    }
    {
        let mut state = health.get_mut("calc").unwrap();
        state.evaluate(now);
    }
    assert_eq!(health.get("calc").unwrap().gate(), Gate::Open);
}

/// Disabled service identifiers are simply absent from the registered set.
#[tokio::test]
async fn disabled_service_is_not_registered() {
    let server = mock_registry().await;
    let adapter = RegistryAdapter::new(server.uri(), "nacos", "nacos");
    let health = new_registry();
    let services = toml_service(false);
    let resolve = |_: &str| -> Option<Arc<dyn ServiceImpl>> { None };

    let entries = register_all(&services, 100.0, 50, Duration::from_secs(30), &adapter, &health, "10.0.0.5", 9000, resolve)
        .await
        .unwrap();

    assert!(entries.is_empty());
    assert!(health.is_empty());
}

/// Unresolvable implementations fail registration fast rather than silently
/// skipping the identifier.
#[tokio::test]
async fn unresolvable_implementation_fails_registration() {
    let server = mock_registry().await;
    let adapter = RegistryAdapter::new(server.uri(), "nacos", "nacos");
    let health = new_registry();
    let services = toml_service(true);
    let resolve = |_: &str| -> Option<Arc<dyn ServiceImpl>> { None };

    let result = register_all(&services, 100.0, 50, Duration::from_secs(30), &adapter, &health, "10.0.0.5", 9000, resolve).await;
    assert!(result.is_err());
}
