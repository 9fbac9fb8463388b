pub mod https;
pub mod quic;
pub mod tcp;
pub mod tls;
pub mod udp;

use async_trait::async_trait;
use fleet_dns_domain::DomainError;
use std::io;
use std::time::Duration;

/// Classify a failed stream exchange by I/O error kind so the pool can
/// tell a peer that hung up from one that never answered.
pub(crate) fn map_exchange_error(server: impl std::fmt::Display, e: io::Error) -> DomainError {
    let server = server.to_string();
    match e.kind() {
        io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => {
            DomainError::TransportConnectionReset { server }
        }
        io::ErrorKind::ConnectionRefused => DomainError::TransportConnectionRefused { server },
        _ => DomainError::IoError(format!("Exchange with {} failed: {}", server, e)),
    }
}

/// One round trip over a single upstream: send a wire-format query, return
/// the wire-format response.
#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn send(&self, message_bytes: &[u8], timeout: Duration) -> Result<Vec<u8>, DomainError>;

    fn protocol_name(&self) -> &'static str;
}

/// Enum dispatch over the transport implementations, one variant per
/// endpoint scheme.
pub enum Transport {
    Udp(udp::UdpTransport),
    Tcp(tcp::TcpTransport),
    Tls(tls::TlsTransport),
    Quic(quic::QuicTransport),
    Https(https::HttpsTransport),
}

impl Transport {
    pub async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, DomainError> {
        match self {
            Self::Udp(t) => DnsTransport::send(t, message_bytes, timeout).await,
            Self::Tcp(t) => DnsTransport::send(t, message_bytes, timeout).await,
            Self::Tls(t) => DnsTransport::send(t, message_bytes, timeout).await,
            Self::Quic(t) => DnsTransport::send(t, message_bytes, timeout).await,
            Self::Https(t) => DnsTransport::send(t, message_bytes, timeout).await,
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            Self::Udp(_) => "UDP",
            Self::Tcp(_) => "TCP",
            Self::Tls(_) => "TLS",
            Self::Quic(_) => "QUIC",
            Self::Https(_) => "HTTPS",
        }
    }
}
