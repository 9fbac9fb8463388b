//! DNS-over-QUIC exchange transport (RFC 9250)
//!
//! ALPN "doq", one query and one response per bidirectional stream, with
//! the same two-byte length framing as TCP. RFC 9250 §4.2.1 requires the
//! DNS message ID on the wire to be zero, so the query ID is masked
//! before framing and restored on the response. The client endpoint is
//! built once per address family by the pool and shared; the established
//! connection is cached on the transport instance and replaced when it
//! reports a close reason or a stream exchange fails.

use super::tcp::{read_with_length_prefix, send_with_length_prefix};
use super::DnsTransport;
use async_trait::async_trait;
use fleet_dns_domain::DomainError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Client config shared by every outbound DoQ endpoint.
pub(crate) fn client_config() -> Result<quinn::ClientConfig, DomainError> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let mut tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    tls_config.alpn_protocols = vec![b"doq".to_vec()];
    tls_config.resumption = rustls::client::Resumption::in_memory_sessions(64);

    let quic_config = quinn::crypto::rustls::QuicClientConfig::try_from(Arc::new(tls_config))
        .map_err(|e| DomainError::ConfigError(format!("Invalid QUIC TLS config: {}", e)))?;
    Ok(quinn::ClientConfig::new(Arc::new(quic_config)))
}

/// One ephemeral-port client endpoint per address family, shared across
/// all DoQ endpoints of the pool.
pub(crate) fn client_endpoint(
    config: quinn::ClientConfig,
    ipv6: bool,
) -> Result<quinn::Endpoint, DomainError> {
    let bind_addr: SocketAddr = if ipv6 {
        SocketAddr::from(([0u16; 8], 0))
    } else {
        SocketAddr::from(([0, 0, 0, 0], 0))
    };
    let mut endpoint = quinn::Endpoint::client(bind_addr)
        .map_err(|e| DomainError::IoError(format!("Failed to bind QUIC client socket: {}", e)))?;
    endpoint.set_default_client_config(config);
    Ok(endpoint)
}

pub struct QuicTransport {
    server_addr: SocketAddr,
    hostname: Arc<str>,
    endpoint: quinn::Endpoint,
    connection: Mutex<Option<quinn::Connection>>,
}

impl QuicTransport {
    pub fn new(server_addr: SocketAddr, hostname: Arc<str>, endpoint: quinn::Endpoint) -> Self {
        Self {
            server_addr,
            hostname,
            endpoint,
            connection: Mutex::new(None),
        }
    }

    async fn get_or_connect(&self, timeout: Duration) -> Result<quinn::Connection, DomainError> {
        let mut cached = self.connection.lock().await;
        if let Some(conn) = cached.as_ref() {
            if conn.close_reason().is_none() {
                return Ok(conn.clone());
            }
            *cached = None;
        }
        let conn = self.connect_new(timeout).await?;
        *cached = Some(conn.clone());
        Ok(conn)
    }

    async fn replace_connection(&self, timeout: Duration) -> Result<quinn::Connection, DomainError> {
        let conn = self.connect_new(timeout).await?;
        *self.connection.lock().await = Some(conn.clone());
        Ok(conn)
    }

    async fn connect_new(&self, timeout: Duration) -> Result<quinn::Connection, DomainError> {
        let connecting = self
            .endpoint
            .connect(self.server_addr, self.hostname.as_ref())
            .map_err(|e| {
                DomainError::IoError(format!(
                    "Failed to initiate QUIC connection to {}: {}",
                    self.server_addr, e
                ))
            })?;

        tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: self.server_addr.to_string(),
            })?
            .map_err(|e| DomainError::TransportConnectionRefused {
                server: format!("{}({}): {}", self.hostname, self.server_addr, e),
            })
    }

    async fn exchange_on_stream(
        conn: &quinn::Connection,
        message_bytes: &[u8],
        timeout: Duration,
        server_addr: SocketAddr,
    ) -> Result<Vec<u8>, DomainError> {
        let deadline = Instant::now() + timeout;

        let (mut send_stream, mut recv_stream) = tokio::time::timeout(timeout, conn.open_bi())
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: server_addr.to_string(),
            })?
            .map_err(|e| {
                DomainError::IoError(format!(
                    "Failed to open QUIC stream to {}: {}",
                    server_addr, e
                ))
            })?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::timeout(
            remaining,
            send_with_length_prefix(&mut send_stream, message_bytes),
        )
        .await
        .map_err(|_| DomainError::TransportTimeout {
            server: server_addr.to_string(),
        })?
        .map_err(|e| super::map_exchange_error(server_addr, e))?;

        send_stream.finish().map_err(|e| {
            DomainError::IoError(format!(
                "Failed to finish QUIC send stream to {}: {}",
                server_addr, e
            ))
        })?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::timeout(remaining, read_with_length_prefix(&mut recv_stream))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: server_addr.to_string(),
            })?
            .map_err(|e| super::map_exchange_error(server_addr, e))
    }
}

/// Copy the message with its transaction ID zeroed for the wire, returning
/// the original ID so the caller can put it back on the response.
fn mask_transaction_id(message_bytes: &[u8]) -> Result<(Vec<u8>, [u8; 2]), DomainError> {
    if message_bytes.len() < 2 {
        return Err(DomainError::MessageEncode(
            "DNS message shorter than its header".to_string(),
        ));
    }
    let id = [message_bytes[0], message_bytes[1]];
    let mut wire = message_bytes.to_vec();
    wire[0] = 0;
    wire[1] = 0;
    Ok((wire, id))
}

fn restore_transaction_id(mut response: Vec<u8>, id: [u8; 2]) -> Vec<u8> {
    if response.len() >= 2 {
        response[0] = id[0];
        response[1] = id[1];
    }
    response
}

#[async_trait]
impl DnsTransport for QuicTransport {
    async fn send(&self, message_bytes: &[u8], timeout: Duration) -> Result<Vec<u8>, DomainError> {
        let (wire, id) = mask_transaction_id(message_bytes)?;
        let conn = self.get_or_connect(timeout).await?;

        match Self::exchange_on_stream(&conn, &wire, timeout, self.server_addr).await {
            Ok(response_bytes) => {
                debug!(server = %self.server_addr, "QUIC query via cached connection");
                return Ok(restore_transaction_id(response_bytes, id));
            }
            Err(_) => {
                debug!(server = %self.server_addr, "QUIC connection stale, reconnecting");
            }
        }

        let fresh_conn = self.replace_connection(timeout).await?;

        let response_bytes =
            Self::exchange_on_stream(&fresh_conn, &wire, timeout, self.server_addr).await?;

        debug!(
            server = %self.server_addr,
            response_len = response_bytes.len(),
            "QUIC response received"
        );

        Ok(restore_transaction_id(response_bytes, id))
    }

    fn protocol_name(&self) -> &'static str {
        "QUIC"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_id_is_zeroed_and_restored() {
        let message = [0xAB, 0xCD, 0x01, 0x00, 0x00, 0x01];
        let (wire, id) = mask_transaction_id(&message).unwrap();

        assert_eq!(&wire[..2], &[0x00, 0x00]);
        assert_eq!(&wire[2..], &message[2..]);
        assert_eq!(id, [0xAB, 0xCD]);

        let restored = restore_transaction_id(wire, id);
        assert_eq!(restored, message);
    }

    #[test]
    fn test_mask_rejects_header_shorter_than_an_id() {
        assert!(mask_transaction_id(&[0xAB]).is_err());
    }
}
