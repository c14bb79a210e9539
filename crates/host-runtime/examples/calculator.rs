// Example: a minimal calculator service.
//
// Run with: cargo run --example calculator

use host_runtime::service::{param, MethodDescriptor, ParamType, ServiceImpl};
use serde_json::{json, Value};
use std::sync::Arc;

struct CalculatorService;

impl ServiceImpl for CalculatorService {
    fn methods(&self) -> Vec<MethodDescriptor> {
        vec![MethodDescriptor::new(
            "calculate",
            vec![
                param("operation", ParamType::String, true),
                param("a", ParamType::Float, true),
                param("b", ParamType::Float, true),
            ],
            Arc::new(|args| {
                Box::pin(async move {
                    let operation = args[0].as_str().unwrap_or_default();
                    let a = args[1].as_f64().unwrap_or_default();
                    let b = args[2].as_f64().unwrap_or_default();

                    let result = match operation {
                        "add" => a + b,
                        "subtract" => a - b,
                        "multiply" => a * b,
                        "divide" => {
                            if b == 0.0 {
                                return Err(host_runtime::service::ServiceError::new("division by zero"));
                            }
                            a / b
                        }
                        other => {
                            return Err(host_runtime::service::ServiceError::new(format!(
                                "unknown operation: {other}"
                            )))
                        }
                    };

                    Ok(json!({ "result": result }))
                })
            }),
        )]
    }
}

#[tokio::main]
async fn main() {
    let service = CalculatorService;

    for (op, a, b) in [("add", 5.0, 3.0), ("subtract", 10.0, 4.0), ("multiply", 6.0, 7.0), ("divide", 20.0, 4.0)] {
        let method = &service.methods()[0];
        let args: Vec<Value> = vec![json!(op), json!(a), json!(b)];
        match (method.invoker)(args).await {
            Ok(output) => println!("{a} {op} {b} = {}", output["result"]),
            Err(e) => println!("error: {e}"),
        }
    }

    let method = &service.methods()[0];
    match (method.invoker)(vec![json!("divide"), json!(10.0), json!(0.0)]).await {
        Ok(_) => println!("should have failed!"),
        Err(e) => println!("correctly caught error: {e}"),
    }
}
