//! Transport (component F, transport half).
//!
//! A non-blocking TCP listener plus one task per accepted connection. Each
//! connection owns its own read/write buffering implicitly through
//! [`tokio::io::BufReader`] and `write_all`, which is the idiomatic
//! async-task equivalent of §4.F's manual per-connection outbound queue:
//! a short write is retried by `write_all` itself, and any I/O error simply
//! ends the task, dropping the connection's state.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::dispatcher::{dispatch_line, DispatchError};
use crate::health::HealthRegistry;
use crate::metrics::MetricsCollector;
use crate::registrar::ServiceEntry;

/// Bind the inbound RPC listener. Binds to `0.0.0.0` so the externally
/// advertised IP (in `HostConfig.instance.ip`) may differ from the bind
/// address (§4.F).
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port)).await
}

/// Accept connections forever, spawning one task per client. Returns only
/// on a listener-level I/O error.
pub async fn serve(
    listener: TcpListener,
    services: Arc<HashMap<String, ServiceEntry>>,
    health: Arc<HealthRegistry>,
    metrics: Arc<MetricsCollector>,
    timeout_threshold: Duration,
) -> Result<(), DispatchError> {
    loop {
        let (socket, peer) = listener.accept().await?;
        let services = Arc::clone(&services);
        let health = Arc::clone(&health);
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            handle_connection(socket, peer, services, health, metrics, timeout_threshold).await;
        });
    }
}

async fn handle_connection(
    socket: TcpStream,
    peer: SocketAddr,
    services: Arc<HashMap<String, ServiceEntry>>,
    health: Arc<HealthRegistry>,
    metrics: Arc<MetricsCollector>,
    timeout_threshold: Duration,
) {
    debug!(tag = "tcp", %peer, "accepted");
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // peer closed
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\n', '\r']);
                if trimmed.is_empty() {
                    continue;
                }
                let response = dispatch_line(trimmed, &services, &health, &metrics, timeout_threshold).await;
                let mut bytes = response.into_bytes();
                bytes.push(b'\n');
                if let Err(e) = writer.write_all(&bytes).await {
                    warn!(tag = "tcp", %peer, error = %e, "write failed");
                    break;
                }
            }
            Err(e) => {
                warn!(tag = "tcp", %peer, error = %e, "read failed");
                break;
            }
        }
    }

    debug!(tag = "tcp", %peer, "closed");
}
