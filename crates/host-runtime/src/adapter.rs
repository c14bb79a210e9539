//! Registry Adapter (component A).
//!
//! A thin authenticated REST wrapper around the registry's instance,
//! config, and auth endpoints (§6, "Registry REST"). Every public method
//! returns `Result<T, AdapterError>` — failures never panic or unwind
//! across this boundary, matching §4.A: "failures are never thrown across
//! the adapter boundary."
//!
//! The access token is held as an [`ArcSwap`]-backed [`CachedToken`], a
//! single atomically-replaceable value (§9, "Token lifecycle"): callers
//! never cache it themselves, and a refresh is one atomic swap with no
//! partially-updated state observable from another call in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{instrument, warn};

const LOGIN_PATH: &str = "/nacos/v1/auth/login";
const CONFIG_PATH: &str = "/nacos/v1/cs/configs";
const CONFIG_LISTENER_PATH: &str = "/nacos/v1/cs/configs/listener";
const INSTANCE_PATH: &str = "/nacos/v1/ns/instance";
const INSTANCE_BEAT_PATH: &str = "/nacos/v1/ns/instance/beat";
const INSTANCE_LIST_PATH: &str = "/nacos/v1/ns/instance/list";

/// Refresh this long before the cached token's stated TTL elapses.
const REFRESH_SKEW: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("registry rejected the request (auth expired or invalid credentials)")]
    Unauthorized,

    #[error("registry returned an error response: {0}")]
    Api(String),

    #[error("registry response could not be decoded: {0}")]
    Decode(String),
}

pub type AdapterResult<T> = Result<T, AdapterError>;

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "tokenTtl")]
    token_ttl: u64,
}

/// Authenticated REST client for the registry's auth, instance, and config
/// endpoints (§4.A, §6).
pub struct RegistryAdapter {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    token: ArcSwap<Option<CachedToken>>,
}

impl RegistryAdapter {
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");

        Self {
            client,
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            token: ArcSwap::from_pointee(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Log in and cache the resulting token, unconditionally.
    #[instrument(skip(self), fields(tag = "init"))]
    pub async fn login(&self) -> AdapterResult<(String, u64)> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .form(&[("username", self.username.as_str()), ("password", self.password.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AdapterError::Api(format!(
                "login failed with status {}",
                response.status()
            )));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Decode(e.to_string()))?;

        self.token.store(Arc::new(Some(CachedToken {
            value: body.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(body.token_ttl),
        })));

        Ok((body.access_token, body.token_ttl))
    }

    /// Return a cached token, transparently re-logging-in when absent or
    /// within [`REFRESH_SKEW`] of expiry (§4.A).
    async fn current_token(&self) -> AdapterResult<String> {
        let cached = self.token.load();
        if let Some(t) = cached.as_ref() {
            if Instant::now() + REFRESH_SKEW < t.expires_at {
                return Ok(t.value.clone());
            }
        }
        let (token, _) = self.login().await?;
        Ok(token)
    }

    /// Force a refresh, discarding whatever is cached. Called after a
    /// 401/403 response from any other endpoint.
    pub async fn force_refresh(&self) -> AdapterResult<String> {
        self.token.store(Arc::new(None));
        let (token, _) = self.login().await?;
        Ok(token)
    }

    fn auth_failure(status: StatusCode) -> bool {
        status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
    }

    #[instrument(skip(self, metadata), fields(tag = "service", safe_name = %safe_name))]
    #[allow(clippy::too_many_arguments)]
    pub async fn create_instance(
        &self,
        safe_name: &str,
        ip: &str,
        port: u16,
        namespace: &str,
        metadata: &HashMap<String, String>,
        weight: f64,
        healthy: bool,
        ephemeral: bool,
    ) -> AdapterResult<()> {
        let token = self.current_token().await?;
        let metadata_json = serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string());
        let port_str = port.to_string();
        let weight_str = weight.to_string();
        let form = [
            ("serviceName", safe_name),
            ("ip", ip),
            ("port", port_str.as_str()),
            ("namespaceId", namespace),
            ("metadata", metadata_json.as_str()),
            ("weight", weight_str.as_str()),
            ("healthy", if healthy { "true" } else { "false" }),
            ("ephemeral", if ephemeral { "true" } else { "false" }),
        ];

        let response = self
            .client
            .post(self.url(INSTANCE_PATH))
            .query(&[("accessToken", token.as_str())])
            .form(&form)
            .send()
            .await?;

        self.check_ack(response).await
    }

    #[instrument(skip(self, metadata), fields(tag = "heartbeat", safe_name = %safe_name))]
    #[allow(clippy::too_many_arguments)]
    pub async fn send_beat(
        &self,
        safe_name: &str,
        ip: &str,
        port: u16,
        namespace: &str,
        metadata: &HashMap<String, String>,
        ephemeral: bool,
        weight: f64,
        interval: u64,
    ) -> AdapterResult<()> {
        let token = self.current_token().await?;
        let beat = serde_json::json!({
            "serviceName": safe_name,
            "ip": ip,
            "port": port,
            "weight": weight,
            "ephemeral": ephemeral,
            "metadata": metadata,
            "scheduled": true,
            "period": interval * 1000,
        });
        let beat_str = beat.to_string();

        let response = self
            .client
            .put(self.url(INSTANCE_BEAT_PATH))
            .query(&[
                ("accessToken", token.as_str()),
                ("serviceName", safe_name),
                ("namespaceId", namespace),
                ("beat", beat_str.as_str()),
            ])
            .send()
            .await?;

        self.check_ack(response).await
    }

    #[instrument(skip(self, metadata), fields(tag = "service", safe_name = %safe_name))]
    #[allow(clippy::too_many_arguments)]
    pub async fn update_weight(
        &self,
        safe_name: &str,
        ip: &str,
        port: u16,
        weight: f64,
        namespace: &str,
        ephemeral: bool,
        metadata: &HashMap<String, String>,
    ) -> AdapterResult<()> {
        let token = self.current_token().await?;
        let metadata_json = serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string());
        let port_str = port.to_string();
        let weight_str = weight.to_string();
        let form = [
            ("serviceName", safe_name),
            ("ip", ip),
            ("port", port_str.as_str()),
            ("namespaceId", namespace),
            ("weight", weight_str.as_str()),
            ("ephemeral", if ephemeral { "true" } else { "false" }),
            ("metadata", metadata_json.as_str()),
        ];

        let response = self
            .client
            .put(self.url(INSTANCE_PATH))
            .query(&[("accessToken", token.as_str())])
            .form(&form)
            .send()
            .await?;

        self.check_ack(response).await
    }

    #[instrument(skip(self), fields(tag = "exit", safe_name = %safe_name))]
    pub async fn remove_instance(
        &self,
        safe_name: &str,
        ip: &str,
        port: u16,
        namespace: &str,
        ephemeral: bool,
    ) -> AdapterResult<()> {
        let token = self.current_token().await?;
        let port_str = port.to_string();
        let response = self
            .client
            .delete(self.url(INSTANCE_PATH))
            .query(&[
                ("accessToken", token.as_str()),
                ("serviceName", safe_name),
                ("ip", ip),
                ("port", port_str.as_str()),
                ("namespaceId", namespace),
                ("ephemeral", if ephemeral { "true" } else { "false" }),
            ])
            .send()
            .await?;

        self.check_ack(response).await
    }

    /// Diagnostic-only: listable instance set for a service. Consumed only
    /// by the shutdown path's best-effort sanity check (§10.5) — never
    /// fatal if it fails.
    #[instrument(skip(self), fields(tag = "exit", safe_name = %safe_name))]
    pub async fn get_instance_list(
        &self,
        safe_name: &str,
        namespace: &str,
        healthy_only: bool,
    ) -> AdapterResult<serde_json::Value> {
        let token = self.current_token().await?;
        let response = self
            .client
            .get(self.url(INSTANCE_LIST_PATH))
            .query(&[
                ("accessToken", token.as_str()),
                ("serviceName", safe_name),
                ("namespaceId", namespace),
                ("healthyOnly", if healthy_only { "true" } else { "false" }),
            ])
            .send()
            .await?;

        self.decode_json(response).await
    }

    #[instrument(skip(self, content), fields(tag = "config", data_id = %data_id))]
    pub async fn publish_config(
        &self,
        data_id: &str,
        group: &str,
        content: &str,
        tenant: &str,
    ) -> AdapterResult<()> {
        let token = self.current_token().await?;
        let form = [
            ("dataId", data_id),
            ("group", group),
            ("content", content),
            ("tenant", tenant),
        ];

        let response = self
            .client
            .post(self.url(CONFIG_PATH))
            .query(&[("accessToken", token.as_str())])
            .form(&form)
            .send()
            .await?;

        self.check_ack(response).await
    }

    #[instrument(skip(self), fields(tag = "config", data_id = %data_id))]
    pub async fn get_config(&self, data_id: &str, group: &str, tenant: &str) -> AdapterResult<String> {
        let token = self.current_token().await?;
        let response = self
            .client
            .get(self.url(CONFIG_PATH))
            .query(&[
                ("accessToken", token.as_str()),
                ("dataId", data_id),
                ("group", group),
                ("tenant", tenant),
            ])
            .send()
            .await?;

        if Self::auth_failure(response.status()) {
            self.force_refresh().await?;
            return Err(AdapterError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(AdapterError::Api(format!(
                "getConfig failed with status {}",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| AdapterError::Decode(e.to_string()))
    }

    /// Build the raw HTTP request bytes for a long-poll listener exchange.
    /// Used by [`crate::configstream`], which owns the raw TCP connection
    /// (the long-poll keep-alive semantics don't fit a pooled HTTP client).
    pub fn listener_path() -> &'static str {
        CONFIG_LISTENER_PATH
    }

    async fn check_ack(&self, response: reqwest::Response) -> AdapterResult<()> {
        if Self::auth_failure(response.status()) {
            self.force_refresh().await?;
            return Err(AdapterError::Unauthorized);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(tag = "error", %status, %body, "registry call rejected");
            return Err(AdapterError::Api(format!("status {status}: {body}")));
        }
        Ok(())
    }

    async fn decode_json(&self, response: reqwest::Response) -> AdapterResult<serde_json::Value> {
        if Self::auth_failure(response.status()) {
            self.force_refresh().await?;
            return Err(AdapterError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(AdapterError::Api(format!("status {}", response.status())));
        }
        response
            .json()
            .await
            .map_err(|e| AdapterError::Decode(e.to_string()))
    }

    /// Borrow the currently-cached token value, if any — used only by the
    /// config long-poll engine to fill the `accessToken` form field without
    /// forcing a synchronous login on every long-poll request.
    pub async fn cached_or_fresh_token(&self) -> AdapterResult<String> {
        self.current_token().await
    }
}
