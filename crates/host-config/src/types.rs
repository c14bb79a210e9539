use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for a single host process, loaded once at startup.
///
/// Every field below is immutable for the lifetime of the process: there is
/// no hot-reload of `HostConfig` itself (only watched remote config entries,
/// via [`ConfigSpec`], change after startup).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    pub server: ServerSection,
    pub instance: InstanceSection,
    #[serde(default)]
    pub health: HealthSection,
    #[serde(default)]
    pub service: HashMap<String, ServiceSpec>,
    #[serde(default)]
    pub config: HashMap<String, ConfigSpec>,
}

/// Registry endpoint and credentials, plus the heartbeat cadence shared by
/// every registered identifier.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSection {
    pub host: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
}

fn default_heartbeat_interval() -> u64 {
    5
}

/// The local network identity advertised to the registry, and the timeout
/// threshold used to classify a call as slow.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstanceSection {
    pub ip: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_timeout_threshold")]
    pub timeout_threshold: u64,
}

fn default_weight() -> f64 {
    100.0
}

fn default_timeout_threshold() -> u64 {
    3000
}

/// Parameters for the rolling-window health controller (component C).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthSection {
    #[serde(default = "default_stat_window_size")]
    pub stat_window_size: usize,
    #[serde(default = "default_adjust_cool_down")]
    pub adjust_cool_down: u64,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            stat_window_size: default_stat_window_size(),
            adjust_cool_down: default_adjust_cool_down(),
        }
    }
}

fn default_stat_window_size() -> usize {
    50
}

fn default_adjust_cool_down() -> u64 {
    30
}

/// One service identifier's registration intent: which implementation to
/// bind, under what registry namespace, and any method-name aliasing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceSpec {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(rename = "serviceName")]
    pub service_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub contract: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    "public".to_string()
}

/// One watched remote configuration entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigSpec {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub publish: bool,
    #[serde(rename = "dataId")]
    pub data_id: String,
    pub group: String,
    #[serde(default = "default_tenant")]
    pub tenant: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub callback: Option<String>,
}

fn default_tenant() -> String {
    "public".to_string()
}
