//! DNS-over-TLS exchange transport (RFC 7858)
//!
//! Same two-byte length framing as TCP, wrapped in TLS 1.2+. The client
//! config is built once by the pool and shared across all DoT endpoints so
//! rustls session resumption amortizes handshakes; idle connections are
//! additionally kept on the transport instance for reuse.

use super::tcp::{read_with_length_prefix, send_with_length_prefix};
use super::DnsTransport;
use async_trait::async_trait;
use fleet_dns_domain::DomainError;
use rustls::pki_types::ServerName;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::debug;

const MAX_IDLE_PER_HOST: usize = 2;

/// Client config shared by every outbound TLS-based transport: webpki
/// roots, no client auth, resumption via the rustls session cache.
pub(crate) fn shared_client_config() -> Arc<rustls::ClientConfig> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

pub struct TlsTransport {
    server_addr: SocketAddr,
    hostname: String,
    tls_config: Arc<rustls::ClientConfig>,
    idle: Mutex<Vec<TlsStream<TcpStream>>>,
}

impl TlsTransport {
    pub fn new(
        server_addr: SocketAddr,
        hostname: String,
        tls_config: Arc<rustls::ClientConfig>,
    ) -> Self {
        Self {
            server_addr,
            hostname,
            tls_config,
            idle: Mutex::new(Vec::new()),
        }
    }

    fn take_pooled(&self) -> Option<TlsStream<TcpStream>> {
        self.idle.lock().ok()?.pop()
    }

    fn return_to_pool(&self, stream: TlsStream<TcpStream>) {
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < MAX_IDLE_PER_HOST {
                idle.push(stream);
            }
        }
    }

    /// Establish a new TLS connection (TCP connect + TLS handshake).
    async fn connect_new(&self, timeout: Duration) -> Result<TlsStream<TcpStream>, DomainError> {
        let connector = tokio_rustls::TlsConnector::from(self.tls_config.clone());

        let server_name = ServerName::try_from(self.hostname.clone()).map_err(|e| {
            DomainError::ConfigError(format!("Invalid TLS hostname '{}': {}", self.hostname, e))
        })?;

        let tcp_stream = tokio::time::timeout(timeout, TcpStream::connect(self.server_addr))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: self.server_addr.to_string(),
            })?
            .map_err(|e| DomainError::TransportConnectionRefused {
                server: format!("{}: {}", self.server_addr, e),
            })?;

        let tls_stream = tokio::time::timeout(timeout, connector.connect(server_name, tcp_stream))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: self.server_addr.to_string(),
            })?
            .map_err(|e| {
                DomainError::IoError(format!(
                    "TLS handshake failed with {}: {}",
                    self.server_addr, e
                ))
            })?;

        debug!(server = %self.server_addr, hostname = %self.hostname, "TLS connection established");
        Ok(tls_stream)
    }

    async fn exchange_on_stream(
        &self,
        stream: &mut TlsStream<TcpStream>,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, DomainError> {
        tokio::time::timeout(timeout, send_with_length_prefix(stream, message_bytes))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: self.server_addr.to_string(),
            })?
            .map_err(|e| super::map_exchange_error(self.server_addr, e))?;

        tokio::time::timeout(timeout, read_with_length_prefix(stream))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: self.server_addr.to_string(),
            })?
            .map_err(|e| super::map_exchange_error(self.server_addr, e))
    }
}

#[async_trait]
impl DnsTransport for TlsTransport {
    async fn send(&self, message_bytes: &[u8], timeout: Duration) -> Result<Vec<u8>, DomainError> {
        if let Some(mut stream) = self.take_pooled() {
            match self
                .exchange_on_stream(&mut stream, message_bytes, timeout)
                .await
            {
                Ok(response_bytes) => {
                    debug!(server = %self.server_addr, "TLS query via pooled connection");
                    self.return_to_pool(stream);
                    return Ok(response_bytes);
                }
                Err(_) => {
                    debug!(server = %self.server_addr, "Pooled TLS connection stale, reconnecting");
                }
            }
        }

        let mut stream = self.connect_new(timeout).await?;

        let response_bytes = self
            .exchange_on_stream(&mut stream, message_bytes, timeout)
            .await?;

        debug!(
            server = %self.server_addr,
            response_len = response_bytes.len(),
            "TLS response received"
        );

        self.return_to_pool(stream);

        Ok(response_bytes)
    }

    fn protocol_name(&self) -> &'static str {
        "TLS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_transport_creation() {
        let addr: SocketAddr = "1.1.1.1:853".parse().unwrap();
        let transport = TlsTransport::new(
            addr,
            "cloudflare-dns.com".to_string(),
            shared_client_config(),
        );
        assert_eq!(transport.server_addr, addr);
        assert_eq!(transport.hostname, "cloudflare-dns.com");
        assert_eq!(transport.protocol_name(), "TLS");
    }

    #[test]
    fn test_shared_client_config_builds() {
        let config = shared_client_config();
        assert!(config.alpn_protocols.is_empty());
    }
}
