//! DNS-over-QUIC listener (RFC 9250)
//!
//! Each client stream carries exactly one query and one length-prefixed
//! response; streams on one connection are served concurrently. The
//! stateless reset key is derived from an interface MAC address so resets
//! stay valid across restarts, falling back to a random key when no
//! usable interface exists.

use super::stream::{read_frame, write_frame};
use super::tls::TlsIdentity;
use super::{reap_tasks, sanitize_src_address};
use async_trait::async_trait;
use fleet_dns_application::{ResolveQueryUseCase, ResponseSink};
use fleet_dns_domain::DomainError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A client must deliver its whole query this quickly after opening a stream.
const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(2);
const CONNECTION_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
/// DNS messages are small, so the flow-control windows stay tight.
const STREAM_RECEIVE_WINDOW: u32 = 4 * 1024;
const CONNECTION_RECEIVE_WINDOW: u32 = 16 * 1024;

pub(crate) fn build_server_endpoint(
    socket: std::net::UdpSocket,
    identity: &TlsIdentity,
) -> Result<quinn::Endpoint, DomainError> {
    let quic_server_config =
        quinn::crypto::rustls::QuicServerConfig::try_from(identity.doq_server_config()?).map_err(
            |e| DomainError::ConfigError(format!("Invalid QUIC server TLS config: {}", e)),
        )?;

    let mut transport = quinn::TransportConfig::default();
    let idle = quinn::IdleTimeout::try_from(CONNECTION_IDLE_TIMEOUT)
        .map_err(|e| DomainError::ConfigError(format!("Invalid QUIC idle timeout: {}", e)))?;
    transport.max_idle_timeout(Some(idle));
    transport.stream_receive_window(quinn::VarInt::from_u32(STREAM_RECEIVE_WINDOW));
    transport.receive_window(quinn::VarInt::from_u32(CONNECTION_RECEIVE_WINDOW));
    // One query per bidirectional stream; unidirectional streams are not
    // part of the protocol.
    transport.max_concurrent_uni_streams(0u32.into());

    let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_server_config));
    server_config.transport_config(Arc::new(transport));

    let endpoint_config = match stateless_reset_config() {
        Some(config) => config,
        None => {
            warn!("no usable interface MAC address, stateless reset key is per-process");
            quinn::EndpointConfig::default()
        }
    };

    quinn::Endpoint::new(
        endpoint_config,
        Some(server_config),
        socket,
        Arc::new(quinn::TokioRuntime),
    )
    .map_err(|e| DomainError::IoError(format!("Failed to create QUIC endpoint: {}", e)))
}

/// Keys the stateless reset tokens off the first physical interface MAC.
fn stateless_reset_config() -> Option<quinn::EndpointConfig> {
    let mac = interface_mac_bytes()?;
    let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, &mac);
    Some(quinn::EndpointConfig::new(Arc::new(key)))
}

#[cfg(target_os = "linux")]
fn interface_mac_bytes() -> Option<Vec<u8>> {
    let entries = std::fs::read_dir("/sys/class/net").ok()?;
    for entry in entries.flatten() {
        if entry.file_name() == "lo" {
            continue;
        }
        let Ok(mac) = std::fs::read_to_string(entry.path().join("address")) else {
            continue;
        };
        let mac = mac.trim();
        if mac.is_empty() || mac.chars().all(|c| c == '0' || c == ':') {
            continue;
        }
        return Some(mac.as_bytes().to_vec());
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn interface_mac_bytes() -> Option<Vec<u8>> {
    None
}

pub(crate) async fn serve_quic(
    endpoint: quinn::Endpoint,
    engine: Arc<ResolveQueryUseCase>,
    shutdown: CancellationToken,
) -> Result<(), DomainError> {
    let mut inner_join_set = JoinSet::new();

    loop {
        let incoming = tokio::select! {
            incoming = endpoint.accept() => match incoming {
                Some(incoming) => incoming,
                None => break,
            },
            _ = shutdown.cancelled() => break,
        };

        let src_addr = incoming.remote_address();
        if let Err(e) = sanitize_src_address(src_addr) {
            warn!(src = %src_addr, "refusing connection: {}", e);
            continue;
        }

        debug!(src = %src_addr, "accepted QUIC connection attempt");
        let engine = engine.clone();
        let conn_shutdown = shutdown.clone();
        inner_join_set.spawn(async move {
            serve_quic_connection(incoming, src_addr, engine, conn_shutdown).await;
        });

        reap_tasks(&mut inner_join_set);
    }

    endpoint.close(0u32.into(), b"");

    if shutdown.is_cancelled() {
        Ok(())
    } else {
        Err(DomainError::IoError(
            "unexpected close of QUIC endpoint".into(),
        ))
    }
}

async fn serve_quic_connection(
    incoming: quinn::Incoming,
    src_addr: SocketAddr,
    engine: Arc<ResolveQueryUseCase>,
    shutdown: CancellationToken,
) {
    let connection = match incoming.await {
        Ok(connection) => connection,
        Err(e) => {
            debug!(src = %src_addr, error = %e, "QUIC handshake failed");
            return;
        }
    };

    let mut stream_join_set = JoinSet::new();
    loop {
        let (send_stream, recv_stream) = tokio::select! {
            stream = connection.accept_bi() => match stream {
                Ok(pair) => pair,
                Err(e) => {
                    debug!(src = %src_addr, reason = %e, "QUIC connection done");
                    break;
                }
            },
            _ = shutdown.cancelled() => {
                connection.close(0u32.into(), b"");
                break;
            }
        };

        // Streams are independent exchanges and run concurrently; ordering
        // only holds within one stream.
        let engine = engine.clone();
        stream_join_set.spawn(async move {
            handle_quic_stream(send_stream, recv_stream, src_addr, engine).await;
        });

        reap_tasks(&mut stream_join_set);
    }
}

async fn handle_quic_stream(
    send_stream: quinn::SendStream,
    mut recv_stream: quinn::RecvStream,
    src_addr: SocketAddr,
    engine: Arc<ResolveQueryUseCase>,
) {
    let frame = match timeout(STREAM_READ_TIMEOUT, read_frame(&mut recv_stream)).await {
        Ok(Ok(Some(frame))) => frame,
        Ok(Ok(None)) => return,
        Ok(Err(e)) => {
            debug!(src = %src_addr, error = %e, "error reading QUIC stream");
            return;
        }
        Err(_) => {
            debug!(src = %src_addr, "QUIC stream read timed out");
            return;
        }
    };

    let mut sink = QuicStreamSink {
        send_stream,
        peer: src_addr,
    };
    if let Err(e) = engine.execute(&frame, &mut sink).await {
        debug!(src = %src_addr, error = %e, "dropped QUIC query");
    }
}

/// Response sink answering one stream, then finishing it.
pub(crate) struct QuicStreamSink {
    send_stream: quinn::SendStream,
    peer: SocketAddr,
}

#[async_trait]
impl ResponseSink for QuicStreamSink {
    async fn send(&mut self, response_bytes: Vec<u8>) -> Result<(), DomainError> {
        write_frame(&mut self.send_stream, &response_bytes)
            .await
            .map_err(|e| {
                DomainError::IoError(format!(
                    "Failed to send QUIC response to {}: {}",
                    self.peer, e
                ))
            })?;
        self.send_stream.finish().map_err(|e| {
            DomainError::IoError(format!(
                "Failed to finish QUIC stream to {}: {}",
                self.peer, e
            ))
        })?;
        Ok(())
    }
}
