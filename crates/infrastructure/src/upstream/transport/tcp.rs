//! TCP exchange transport (RFC 1035 §4.2.2)
//!
//! Messages are framed with a two-byte big-endian length prefix. Idle
//! connections are kept on the transport instance and reused; a query sent
//! over a stale pooled connection is retried once on a fresh one.

use super::DnsTransport;
use async_trait::async_trait;
use fleet_dns_domain::DomainError;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const MAX_TCP_MESSAGE_SIZE: usize = 65535;
const MAX_IDLE_PER_HOST: usize = 2;

pub struct TcpTransport {
    server_addr: SocketAddr,
    idle: Mutex<Vec<TcpStream>>,
}

impl TcpTransport {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            idle: Mutex::new(Vec::new()),
        }
    }

    fn take_pooled(&self) -> Option<TcpStream> {
        self.idle.lock().ok()?.pop()
    }

    fn return_to_pool(&self, stream: TcpStream) {
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < MAX_IDLE_PER_HOST {
                idle.push(stream);
            }
        }
    }

    async fn connect_new(&self, timeout: Duration) -> Result<TcpStream, DomainError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(self.server_addr))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: self.server_addr.to_string(),
            })?
            .map_err(|e| DomainError::TransportConnectionRefused {
                server: format!("{}: {}", self.server_addr, e),
            })?;

        stream.set_nodelay(true).map_err(|e| {
            DomainError::IoError(format!(
                "Failed to set TCP_NODELAY on {}: {}",
                self.server_addr, e
            ))
        })?;

        Ok(stream)
    }

    async fn exchange_on_stream(
        &self,
        stream: &mut TcpStream,
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
impl DnsTransport for TcpTransport {
    async fn send(&self, message_bytes: &[u8], timeout: Duration) -> Result<Vec<u8>, DomainError> {
        // Try reusing a pooled connection first
        if let Some(mut stream) = self.take_pooled() {
            match self
                .exchange_on_stream(&mut stream, message_bytes, timeout)
                .await
            {
                Ok(response_bytes) => {
                    debug!(server = %self.server_addr, "TCP query via pooled connection");
                    self.return_to_pool(stream);
                    return Ok(response_bytes);
                }
                Err(_) => {
                    debug!(server = %self.server_addr, "Pooled TCP connection stale, reconnecting");
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
            "TCP response received"
        );

        self.return_to_pool(stream);

        Ok(response_bytes)
    }

    fn protocol_name(&self) -> &'static str {
        "TCP"
    }
}

pub(crate) async fn send_with_length_prefix<S>(
    stream: &mut S,
    message_bytes: &[u8],
) -> std::io::Result<()>
where
    S: AsyncWriteExt + Unpin,
{
    let length = message_bytes.len() as u16;
    let length_bytes = length.to_be_bytes();

    stream.write_all(&length_bytes).await?;
    stream.write_all(message_bytes).await?;
    stream.flush().await?;

    Ok(())
}

pub(crate) async fn read_with_length_prefix<S>(stream: &mut S) -> std::io::Result<Vec<u8>>
where
    S: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;

    let response_len = u16::from_be_bytes(len_buf) as usize;

    if response_len > MAX_TCP_MESSAGE_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "Response too large: {} bytes (max {})",
                response_len, MAX_TCP_MESSAGE_SIZE
            ),
        ));
    }

    let mut response = vec![0u8; response_len];
    stream.read_exact(&mut response).await?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_length_prefix_round_trip() {
        let message = vec![0xAB; 300];
        let mut writer = std::io::Cursor::new(Vec::new());
        send_with_length_prefix(&mut writer, &message)
            .await
            .unwrap();

        let wire = writer.into_inner();
        assert_eq!(wire.len(), 302);
        assert_eq!(&wire[..2], &300u16.to_be_bytes());

        let mut reader = wire.as_slice();
        let decoded = read_with_length_prefix(&mut reader).await.unwrap();
        assert_eq!(decoded, message);
    }

    #[tokio::test]
    async fn test_read_rejects_truncated_body() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&100u16.to_be_bytes());
        wire.extend_from_slice(&[0u8; 40]);

        let mut reader = wire.as_slice();
        assert!(read_with_length_prefix(&mut reader).await.is_err());
    }

    #[test]
    fn test_tcp_transport_creation() {
        let addr: SocketAddr = "8.8.8.8:53".parse().unwrap();
        let transport = TcpTransport::new(addr);
        assert_eq!(transport.server_addr, addr);
        assert_eq!(transport.protocol_name(), "TCP");
    }
}
