//! Config long-poll engine (component E).
//!
//! Maintains one keep-alive TCP connection per watched [`host_config::ConfigSpec`],
//! hand-framing the registry's long-polling HTTP exchange (§4.E, §9 "Long-poll
//! framing is fragile"). A pooled HTTP client doesn't fit here: the registry
//! holds the connection open for up to 30 s per request and the protocol is a
//! raw byte-separated record format, not JSON — so this module owns the
//! socket directly rather than going through [`crate::adapter::RegistryAdapter`]'s
//! `reqwest::Client`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use md5::{Digest, Md5};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::adapter::RegistryAdapter;

pub const WS: u8 = 0x02;
pub const LS: u8 = 0x01;

const LONG_POLL_TIMEOUT_MS: u64 = 30_000;
/// Margin added on top of the server's stated long-poll timeout before this
/// side gives up and treats the round trip as a dead connection.
const READ_GRACE: Duration = Duration::from_secs(5);
const MIN_RETRY_BACKOFF: Duration = Duration::from_secs(5);
const ERROR_RETRY_BACKOFF: Duration = Duration::from_secs(3);
const AUTH_RETRY_BACKOFF: Duration = Duration::from_secs(2);
/// Spec's idle-keepalive heuristic: relevant under a reactor-style shared
/// loop where a socket may sit unused between ticks; this engine always
/// re-primes the next long-poll request immediately after processing a
/// response, so in practice this window is rarely reached.
const KEEPALIVE_IDLE: Duration = Duration::from_secs(55);

#[derive(Debug, Error)]
pub enum ConfigStreamError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed HTTP response from registry")]
    Malformed,
    #[error("registry rejected the watch request with status {0}")]
    Rejected(u16),
}

/// Outcome of processing one long-poll response.
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing changed; reuse the connection for the next long-poll.
    NoChange,
    /// The watched entry changed; the caller should fetch and diff.
    Changed,
    /// 401/403 — caller must refresh the token and retry after a short backoff.
    AuthRequired,
    /// 400 — retry after a slightly longer backoff.
    BadRequest,
}

/// Build the watch payload for one or more watched entries:
/// `dataId⟨WS⟩group⟨WS⟩md5(content)⟨LS⟩` concatenated (§6, "Long-poll framing").
pub fn build_watch_payload(watches: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (data_id, group, content) in watches {
        out.extend_from_slice(data_id.as_bytes());
        out.push(WS);
        out.extend_from_slice(group.as_bytes());
        out.push(WS);
        out.extend_from_slice(content_md5(content).as_bytes());
        out.push(LS);
    }
    out
}

pub fn content_md5(content: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Parse a (URL-decoded) change-notification body into `(dataId, group)`
/// pairs, normalizing an empty group to `"default"` (§4.E).
pub fn parse_change_records(body: &str) -> Vec<(String, String)> {
    body.split(LS as char)
        .filter(|record| !record.is_empty())
        .filter_map(|record| {
            let mut fields = record.split(WS as char);
            let data_id = fields.next()?;
            let group = fields.next().unwrap_or("");
            let group = if group.is_empty() { "default" } else { group };
            Some((data_id.to_string(), group.to_string()))
        })
        .collect()
}

/// Decode an HTTP chunked-transfer-encoded body into its raw bytes.
/// Operates purely on bytes, never codepoints (§9).
pub fn dechunk(input: &[u8]) -> Result<Vec<u8>, ConfigStreamError> {
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        let line_end = find_crlf(input, pos).ok_or(ConfigStreamError::Malformed)?;
        let size_line = std::str::from_utf8(&input[pos..line_end]).map_err(|_| ConfigStreamError::Malformed)?;
        let size_str = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16).map_err(|_| ConfigStreamError::Malformed)?;
        pos = line_end + 2;
        if size == 0 {
            break;
        }
        if pos + size > input.len() {
            return Err(ConfigStreamError::Malformed);
        }
        out.extend_from_slice(&input[pos..pos + size]);
        pos += size + 2; // skip chunk data + trailing CRLF
    }
    Ok(out)
}

fn find_crlf(input: &[u8], from: usize) -> Option<usize> {
    input[from..].windows(2).position(|w| w == b"\r\n").map(|p| p + from)
}

/// Raw HTTP/1.1 response: status code and fully-decoded body (dechunked if
/// necessary).
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

async fn read_http_response(stream: &mut TcpStream) -> Result<RawResponse, ConfigStreamError> {
    let mut reader = BufReader::new(stream);

    let mut status_line = String::new();
    reader.read_line(&mut status_line).await?;
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or(ConfigStreamError::Malformed)?;

    let mut headers: HashMap<String, String> = HashMap::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" || line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }
    }

    let chunked = headers
        .get("transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);

    let body = if chunked {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw).await?;
        dechunk(&raw)?
    } else if let Some(len) = headers.get("content-length").and_then(|v| v.parse::<usize>().ok()) {
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        buf
    } else {
        Vec::new()
    };

    Ok(RawResponse { status, body })
}

fn build_listener_request(host: &str, payload: &[u8], tenant: &str, token: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"Listening-Configs=");
    body.extend_from_slice(
        percent_encoding::percent_encode(payload, percent_encoding::NON_ALPHANUMERIC)
            .to_string()
            .as_bytes(),
    );
    body.extend_from_slice(format!("&tenant={tenant}&accessToken={token}").as_bytes());

    let mut request = Vec::new();
    request.extend_from_slice(
        format!(
            "POST /nacos/v1/cs/configs/listener HTTP/1.1\r\n\
             Host: {host}\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\
             Long-Pulling-Timeout: {LONG_POLL_TIMEOUT_MS}\r\n\
             Connection: keep-alive\r\n\
             Content-Length: {}\r\n\r\n",
            body.len()
        )
        .as_bytes(),
    );
    request.extend_from_slice(&body);
    request
}

/// One round trip of the long-poll protocol against an already-connected
/// socket: send the watch request, read the response, and classify it.
pub async fn poll_once(
    stream: &mut TcpStream,
    host: &str,
    data_id: &str,
    group: &str,
    current_content: &str,
    tenant: &str,
    token: &str,
) -> Result<PollOutcome, ConfigStreamError> {
    let payload = build_watch_payload(&[(data_id, group, current_content)]);
    let request = build_listener_request(host, &payload, tenant, token);
    stream.write_all(&request).await?;

    let response = tokio::time::timeout(
        Duration::from_millis(LONG_POLL_TIMEOUT_MS) + READ_GRACE,
        read_http_response(stream),
    )
    .await
    .map_err(|_| ConfigStreamError::Malformed)??;

    match response.status {
        401 | 403 => Ok(PollOutcome::AuthRequired),
        400 => Ok(PollOutcome::BadRequest),
        200 => {
            if response.body.is_empty() {
                Ok(PollOutcome::NoChange)
            } else {
                let decoded = percent_encoding::percent_decode(&response.body)
                    .decode_utf8()
                    .map_err(|_| ConfigStreamError::Malformed)?;
                let records = parse_change_records(&decoded);
                if records.iter().any(|(d, g)| d == data_id && g == group) {
                    Ok(PollOutcome::Changed)
                } else {
                    Ok(PollOutcome::NoChange)
                }
            }
        }
        other => Err(ConfigStreamError::Rejected(other)),
    }
}

/// One watched config entry's sink, invoked synchronously on the event loop
/// with the new content (§9, "Configuration callback").
pub type ConfigSink = Box<dyn Fn(&str) + Send + Sync>;

/// Drive one watched entry forever: connect, long-poll, fetch-on-change,
/// invoke the sink, and retry with backoff on any I/O error. Intended to be
/// spawned as one task per enabled `ConfigSpec` (§3, "ConfigStream").
pub async fn run_watch(
    registry_host: String,
    registry_authority: String,
    data_id: String,
    group: String,
    tenant: String,
    mut last_content: String,
    adapter: std::sync::Arc<RegistryAdapter>,
    sink: ConfigSink,
) {
    let mut last_retry_at: Option<Instant> = None;

    loop {
        if let Some(at) = last_retry_at {
            let elapsed = at.elapsed();
            if elapsed < MIN_RETRY_BACKOFF {
                tokio::time::sleep(MIN_RETRY_BACKOFF - elapsed).await;
            }
        }

        let token = match adapter.cached_or_fresh_token().await {
            Ok(t) => t,
            Err(e) => {
                warn!(tag = "config", data_id = %data_id, error = %e, "token refresh failed, retrying");
                last_retry_at = Some(Instant::now());
                tokio::time::sleep(ERROR_RETRY_BACKOFF).await;
                continue;
            }
        };

        let mut stream = match TcpStream::connect(&registry_authority).await {
            Ok(s) => s,
            Err(e) => {
                warn!(tag = "config", data_id = %data_id, error = %e, "connect failed, retrying");
                last_retry_at = Some(Instant::now());
                tokio::time::sleep(ERROR_RETRY_BACKOFF).await;
                continue;
            }
        };

        loop {
            let outcome = poll_once(
                &mut stream,
                &registry_host,
                &data_id,
                &group,
                &last_content,
                &tenant,
                &token,
            )
            .await;

            match outcome {
                Ok(PollOutcome::NoChange) => {
                    // Reuse the connection: loop back and send the next
                    // long-poll request immediately.
                    continue;
                }
                Ok(PollOutcome::Changed) => {
                    match adapter.get_config(&data_id, &group, &tenant).await {
                        Ok(new_content) if new_content != last_content => {
                            last_content = new_content;
                            sink(&last_content);
                            info!(tag = "config", data_id = %data_id, "sink invoked");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(tag = "config", data_id = %data_id, error = %e, "fetch after change failed");
                        }
                    }
                    continue;
                }
                Ok(PollOutcome::AuthRequired) => {
                    warn!(tag = "config", data_id = %data_id, "auth required, refreshing");
                    if let Err(e) = adapter.force_refresh().await {
                        warn!(tag = "config", data_id = %data_id, error = %e, "forced token refresh failed");
                    }
                    last_retry_at = Some(Instant::now());
                    tokio::time::sleep(AUTH_RETRY_BACKOFF).await;
                    break;
                }
                Ok(PollOutcome::BadRequest) => {
                    warn!(tag = "config", data_id = %data_id, "bad request, retrying");
                    last_retry_at = Some(Instant::now());
                    tokio::time::sleep(ERROR_RETRY_BACKOFF).await;
                    break;
                }
                Err(e) => {
                    warn!(tag = "config", data_id = %data_id, error = %e, "stream error, tearing down");
                    last_retry_at = Some(Instant::now());
                    tokio::time::sleep(ERROR_RETRY_BACKOFF).await;
                    break;
                }
            }
        }
    }
}

/// Whether a keepalive probe (`"\r\n"`) should be sent: the connection has
/// been idle at least [`KEEPALIVE_IDLE`] with nothing already pending.
pub fn needs_keepalive(idle_since: Instant, has_pending_send: bool) -> bool {
    !has_pending_send && idle_since.elapsed() >= KEEPALIVE_IDLE
}
