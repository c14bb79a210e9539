//! Event loop (component G) and overall host lifecycle.
//!
//! Ties the registrar (B), health controller (C), heartbeat scheduler (D),
//! config long-poll engine (E), and transport/dispatcher (F) together under
//! one [`Host`]. Rather than a hand-rolled readiness loop over one selector,
//! this multiplexes the same components as concurrent `tokio` tasks on a
//! single-threaded logical timeline (§9, "Cooperative event loop with mixed
//! readiness"): per-identifier state lives in a `DashMap` so two operations
//! against the same identifier's `HealthState` can never interleave,
//! matching §5's ordering guarantee without a manual scheduler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use host_config::HostConfig;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::adapter::RegistryAdapter;
use crate::health::{new_registry, Adjustment, HealthRegistry};
use crate::metrics::MetricsCollector;
use crate::registrar::{register_all, ServiceEntry};
use crate::service::ServiceImpl;
use crate::{transport, Error, Result};

const HEALTH_EVAL_PERIOD: Duration = Duration::from_secs(5);

/// A fully registered, running host instance.
pub struct Host {
    config: HostConfig,
    adapter: Arc<RegistryAdapter>,
    services: Arc<HashMap<String, ServiceEntry>>,
    health: Arc<HealthRegistry>,
    metrics: Arc<MetricsCollector>,
    shutdown: Arc<Notify>,
}

impl Host {
    /// Construct the adapter, instantiate and register every enabled
    /// service (component B), and return a `Host` ready to `run()`.
    ///
    /// `resolve` maps a `ServiceSpec.serviceName` to a concrete
    /// implementation; any identifier that fails to resolve or register is
    /// a fatal startup error (§4.B, §7 "Configuration invalid").
    pub async fn bootstrap<F>(config: HostConfig, resolve: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<Arc<dyn ServiceImpl>>,
    {
        host_config::validate_config(&config).map_err(Error::Config)?;

        let adapter = Arc::new(RegistryAdapter::new(
            config.server.host.clone(),
            config.server.username.clone(),
            config.server.password.clone(),
        ));

        let health = new_registry();
        let cooldown = Duration::from_secs(config.health.adjust_cool_down);

        let services = register_all(
            &config.service,
            config.instance.weight,
            config.health.stat_window_size,
            cooldown,
            &adapter,
            &health,
            &config.instance.ip,
            config.instance.port,
            resolve,
        )
        .await?;

        info!(tag = "init", count = services.len(), "services registered");

        Ok(Self {
            config,
            adapter,
            services: Arc::new(services),
            health: Arc::new(health),
            metrics: Arc::new(MetricsCollector::new()),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// A clone of the shutdown handle: calling `.notify_one()` on it from
    /// another task (e.g. a signal handler) ends [`Host::run`].
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Lifetime request/error/latency counters, for an operator-facing
    /// `/metrics` export (§10.1). Separate from the health controller's
    /// rolling window, which this never feeds.
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    /// Spawn all background tasks (transport, heartbeat, health evaluation,
    /// config long-poll streams) and block until shutdown is requested.
    /// Safe to call once.
    pub async fn run(&self) -> Result<()> {
        let listener = transport::bind(self.config.instance.port).await?;
        let timeout_threshold = Duration::from_millis(self.config.instance.timeout_threshold);

        let serve_task = tokio::spawn(transport::serve(
            listener,
            Arc::clone(&self.services),
            Arc::clone(&self.health),
            Arc::clone(&self.metrics),
            timeout_threshold,
        ));

        let heartbeat_task = {
            let services = Arc::clone(&self.services);
            let health = Arc::clone(&self.health);
            let adapter = Arc::clone(&self.adapter);
            let ip = self.config.instance.ip.clone();
            let port = self.config.instance.port;
            let interval_secs = self.config.server.heartbeat_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
                loop {
                    ticker.tick().await;
                    crate::heartbeat::tick(&services, &health, &adapter, &ip, port, interval_secs).await;
                }
            })
        };

        let health_eval_task = {
            let services = Arc::clone(&self.services);
            let health = Arc::clone(&self.health);
            let adapter = Arc::clone(&self.adapter);
            let ip = self.config.instance.ip.clone();
            let port = self.config.instance.port;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(HEALTH_EVAL_PERIOD);
                loop {
                    ticker.tick().await;
                    evaluate_all(&services, &health, &adapter, &ip, port).await;
                }
            })
        };

        let config_tasks = self.spawn_config_watches();

        self.shutdown.notified().await;

        serve_task.abort();
        heartbeat_task.abort();
        health_eval_task.abort();
        for task in config_tasks {
            task.abort();
        }

        self.shutdown().await;
        Ok(())
    }

    fn spawn_config_watches(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        let authority = registry_authority(&self.config.server.host);
        let host_header = registry_host(&self.config.server.host);

        for spec in self.config.config.values() {
            if !spec.enable {
                continue;
            }
            let adapter = Arc::clone(&self.adapter);
            let data_id = spec.data_id.clone();
            let group = spec.group.clone();
            let tenant = spec.tenant.clone();
            let authority = authority.clone();
            let host_header = host_header.clone();

            if spec.publish {
                // publish-on-start: best effort, logged, never fatal.
                let adapter = Arc::clone(&adapter);
                let data_id = data_id.clone();
                let group = group.clone();
                let tenant = tenant.clone();
                tokio::spawn(async move {
                    if let Err(e) = adapter.publish_config(&data_id, &group, "", &tenant).await {
                        warn!(tag = "config", data_id = %data_id, error = %e, "publish-on-start failed");
                    }
                });
            }

            let sink: crate::configstream::ConfigSink = Box::new(|_content: &str| {});

            let handle = tokio::spawn(crate::configstream::run_watch(
                host_header,
                authority,
                data_id,
                group,
                tenant,
                String::new(),
                adapter,
                sink,
            ));
            handles.push(handle);
        }
        handles
    }

    /// §6, "Shutdown": remove every registered identifier from the
    /// registry. Safe to invoke once; `run()` calls this automatically when
    /// asked to stop.
    async fn shutdown(&self) {
        for (key, entry) in self.services.iter() {
            let _ = self
                .adapter
                .get_instance_list(&entry.safe_name, &entry.namespace, false)
                .await;

            match self
                .adapter
                .remove_instance(&entry.safe_name, &self.config.instance.ip, self.config.instance.port, &entry.namespace, true)
                .await
            {
                Ok(()) => info!(tag = "exit", identifier = %key, "deregistered"),
                Err(e) => warn!(tag = "exit", identifier = %key, error = %e, "deregistration failed"),
            }
        }
        info!(tag = "exit", "shutdown complete");
    }
}

/// Evaluation tick (component C, driven by G): evaluate every identifier's
/// window, then commit any weight change only after the adapter call that
/// advertises it succeeds (§4.C). Health-state guards are never held across
/// an `.await`: decisions are collected first, then applied.
async fn evaluate_all(
    services: &HashMap<String, ServiceEntry>,
    health: &HealthRegistry,
    adapter: &RegistryAdapter,
    ip: &str,
    port: u16,
) {
    let now = Instant::now();
    let mut weight_changes = Vec::new();

    for mut entry in health.iter_mut() {
        let (gate_adj, weight_adj) = entry.value_mut().evaluate(now);
        match gate_adj {
            Some(Adjustment::GateClosed) => info!(tag = "error", identifier = %entry.key(), "circuit opened (heartbeats stopped)"),
            Some(Adjustment::GateOpened) => info!(tag = "error", identifier = %entry.key(), "circuit closed (heartbeats resumed)"),
            _ => {}
        }
        if let Some(Adjustment::WeightChanged(w)) = weight_adj {
            weight_changes.push((entry.key().clone(), w));
        }
    }

    for (key, new_weight) in weight_changes {
        let Some(service) = services.get(&key) else { continue };
        let (service_metadata, description) = service.metadata_payload();
        let mut metadata = HashMap::new();
        metadata.insert("serviceMetadata".to_string(), service_metadata);
        metadata.insert("description".to_string(), description);

        let result = adapter
            .update_weight(&service.safe_name, ip, port, new_weight, &service.namespace, true, &metadata)
            .await;

        match result {
            Ok(()) => {
                if let Some(mut state) = health.get_mut(&key) {
                    state.commit_weight(new_weight, now);
                }
                info!(tag = "service", identifier = %key, weight = new_weight, "weight committed");
            }
            Err(e) => warn!(tag = "service", identifier = %key, error = %e, "weight update failed, not committed"),
        }
    }
}

fn registry_authority(host: &str) -> String {
    let stripped = host.trim_start_matches("http://").trim_start_matches("https://");
    if stripped.contains(':') {
        stripped.to_string()
    } else {
        format!("{stripped}:80")
    }
}

fn registry_host(host: &str) -> String {
    host.trim_start_matches("http://")
        .trim_start_matches("https://")
        .split(':')
        .next()
        .unwrap_or(host)
        .to_string()
}
