//! Service registrar and metadata reflector (component B).
//!
//! At startup, instantiates each enabled service, builds its advertised
//! metadata payload from the declared [`MethodDescriptor`]s, derives the
//! registry-safe name, and performs the initial registration through the
//! [`crate::adapter::RegistryAdapter`].

use std::collections::HashMap;
use std::sync::Arc;

use host_config::ServiceSpec;
use serde::Serialize;
use serde_json::Value;

use crate::adapter::RegistryAdapter;
use crate::service::{MethodDescriptor, ServiceImpl};
use crate::{Error, Result};

/// Registry-safe name: `"SERVICE@@" + sanitize(k)`, where `sanitize`
/// removes every byte outside `[A-Za-z0-9_-]`.
pub fn safe_registry_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 9);
    out.push_str("SERVICE@@");
    out.extend(key.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-'));
    out
}

#[derive(Debug, Serialize)]
struct WireParam<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    type_tag: &'a str,
    required: bool,
}

#[derive(Debug, Serialize)]
struct WireMethod<'a> {
    params: Vec<WireParam<'a>>,
}

#[derive(Debug, Serialize)]
struct ServiceMetadataBody<'a> {
    #[serde(rename = "serviceKey")]
    service_key: &'a str,
    methods: HashMap<&'a str, WireMethod<'a>>,
    contract: &'a HashMap<String, String>,
}

/// A resolved, registered service bound to its identifier key.
pub struct ServiceEntry {
    pub key: String,
    pub namespace: String,
    pub group: String,
    pub methods: Vec<MethodDescriptor>,
    pub contract: HashMap<String, String>,
    pub implementation: Arc<dyn ServiceImpl>,
    pub safe_name: String,
}

impl ServiceEntry {
    /// Resolve `funcName` through the contract alias map, falling back to
    /// the name itself, then locate the matching method descriptor.
    pub fn resolve_method(&self, func_name: &str) -> Option<&MethodDescriptor> {
        let real_name = self
            .contract
            .get(func_name)
            .map(|s| s.as_str())
            .unwrap_or(func_name);
        self.methods.iter().find(|m| m.name == real_name)
    }

    /// Build the `serviceMetadata` JSON string and human description
    /// advertised at registration time.
    pub fn metadata_payload(&self) -> (String, String) {
        let methods: HashMap<&str, WireMethod> = self
            .methods
            .iter()
            .map(|m| {
                let params = m
                    .params
                    .iter()
                    .map(|p| WireParam {
                        name: &p.name,
                        type_tag: p.type_tag.tag(),
                        required: p.required,
                    })
                    .collect();
                (m.name.as_str(), WireMethod { params })
            })
            .collect();

        let body = ServiceMetadataBody {
            service_key: &self.key,
            methods,
            contract: &self.contract,
        };

        let service_metadata =
            serde_json::to_string(&body).expect("metadata body is always serializable");
        let description = format!("service host entry for '{}'", self.key);
        (service_metadata, description)
    }
}

/// Instantiate every enabled service, resolve it against the caller-supplied
/// implementation factory, and register it with the adapter.
///
/// `resolve` maps a `ServiceSpec.service_name` to a concrete implementation;
/// this stands in for the source's runtime class lookup.
///
/// Also pre-populates `health` with one freshly-initialized `HealthState`
/// per registered identifier (§3, "HealthState (per k)"): the dispatcher
/// and controller only ever look up entries that already exist.
#[allow(clippy::too_many_arguments)]
pub async fn register_all<F>(
    services: &HashMap<String, ServiceSpec>,
    base_weight: f64,
    window_size: usize,
    cooldown: std::time::Duration,
    adapter: &RegistryAdapter,
    health: &crate::health::HealthRegistry,
    ip: &str,
    port: u16,
    resolve: F,
) -> Result<HashMap<String, ServiceEntry>>
where
    F: Fn(&str) -> Option<Arc<dyn ServiceImpl>>,
{
    let mut entries = HashMap::new();

    for (key, spec) in services {
        if !spec.enable {
            continue;
        }

        let implementation = resolve(&spec.service_name)
            .ok_or_else(|| Error::UnresolvableImplementation(spec.service_name.clone()))?;

        let methods = implementation.methods();
        let safe_name = safe_registry_name(key);

        let entry = ServiceEntry {
            key: key.clone(),
            namespace: spec.namespace.clone(),
            group: "DEFAULT_GROUP".to_string(),
            methods,
            contract: spec.contract.clone(),
            implementation,
            safe_name: safe_name.clone(),
        };

        let (service_metadata, description) = entry.metadata_payload();
        let mut metadata = HashMap::new();
        metadata.insert("serviceMetadata".to_string(), service_metadata);
        metadata.insert("description".to_string(), description);

        adapter
            .create_instance(
                &safe_name,
                ip,
                port,
                &entry.namespace,
                &metadata,
                base_weight,
                true,
                true,
            )
            .await
            .map_err(|e| Error::RegistrationFailed(key.clone(), e.to_string()))?;

        health.insert(
            key.clone(),
            crate::health::HealthState::new(window_size, base_weight, cooldown),
        );
        entries.insert(key.clone(), entry);
    }

    Ok(entries)
}

/// Round-trip the `serviceMetadata` JSON for an entry: used by the invariant
/// that `parse(serialize(methods)) == methods`.
pub fn metadata_round_trips(entry: &ServiceEntry) -> bool {
    let (json, _) = entry.metadata_payload();
    let value: Value = match serde_json::from_str(&json) {
        Ok(v) => v,
        Err(_) => return false,
    };
    value.get("methods").map(|m| m.is_object()).unwrap_or(false)
}
